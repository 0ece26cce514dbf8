//! Per-vehicle bridge worker between the simulator and the autopilot's
//! physics-input socket.
//!
//! Each iteration opportunistically sends a freshly sampled FDM frame and
//! receives the next actuator frame; receipt of a frame advances the
//! simulation exactly one timestep. The peer address of the first inbound
//! datagram is captured once and opens the distance-sensor path; there is no
//! re-discovery.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::distance::{DistanceRelay, DistanceSensorReading};
use crate::error::SimulatorError;
use crate::fdm::ControlSurfaceFrame;
use crate::mixer;
use crate::vehicle::SimVehicle;
use crate::SimConfig;

/// Physics-input port for a vehicle instance.
pub fn physics_port(base_port: u16, instance: u16) -> u16 {
    base_port + 10 * instance
}

/// Run the bridge for one vehicle instance until the simulator disconnects.
///
/// Terminal only on `Disconnected` (or a socket setup failure); everything
/// else — send backpressure, short frames, telemetry hiccups — is swallowed
/// per attempt, because this loop also drives actuation.
pub async fn run_instance(
    cfg: &SimConfig,
    instance: u16,
    mut vehicle: Box<dyn SimVehicle>,
) -> Result<(), SimulatorError> {
    // The FDM side lives one above the physics port, so both must fit.
    let wide = u32::from(cfg.base_port) + 10 * u32::from(instance);
    if wide + 1 > u32::from(u16::MAX) {
        return Err(SimulatorError::InvalidPort(wide));
    }
    let port = wide as u16;
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    info!(instance, port, "listening for autopilot physics link");

    let step = Duration::from_millis(vehicle.timestep_ms().max(1) as u64);
    let recv_timeout = Duration::from_millis(cfg.recv_timeout_ms);
    let range_interval_s = cfg.range_interval_ms as f64 / 1000.0;
    let scale = vehicle.max_wheel_velocity().min(cfg.motor_velocity_cap);
    let fdm_dest = SocketAddr::from((cfg.sitl_address, port + 1));

    let mut buf = [0u8; 512];

    // Rendezvous: keep the simulation stepping while waiting for the
    // autopilot's first datagram.
    let (first_len, peer) = loop {
        tokio::select! {
            r = socket.recv_from(&mut buf) => break r?,
            _ = tokio::time::sleep(step) => vehicle.step()?,
        }
    };
    info!(instance, %peer, "autopilot physics link established");

    let mut relay = DistanceRelay::open(peer.ip(), cfg.relay_port);
    let mut last_range_s = f64::NEG_INFINITY;

    apply_controls(vehicle.as_mut(), &buf[..first_len], scale, instance);
    vehicle.step()?;
    send_range(&mut relay, vehicle.as_mut(), &mut last_range_s, range_interval_s, instance);

    loop {
        // Opportunistic FDM send; the physics path never blocks on it.
        let frame = vehicle.sample_fdm();
        match socket.try_send_to(&frame.encode(), fdm_dest) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => debug!(instance, "fdm send failed: {e}"),
        }

        match timeout(recv_timeout, socket.recv_from(&mut buf)).await {
            // No actuator frame yet; resend FDM and keep waiting.
            Err(_) => continue,
            Ok(Err(e)) => {
                warn!(instance, "physics recv failed: {e}");
                continue;
            }
            Ok(Ok((len, _))) => {
                apply_controls(vehicle.as_mut(), &buf[..len], scale, instance);
                vehicle.step()?;
                send_range(
                    &mut relay,
                    vehicle.as_mut(),
                    &mut last_range_s,
                    range_interval_s,
                    instance,
                );
            }
        }
    }
}

fn apply_controls(vehicle: &mut dyn SimVehicle, data: &[u8], scale: f32, instance: u16) {
    match ControlSurfaceFrame::decode(data) {
        Ok(frame) => {
            let mix = mixer::mix(frame.steering(), frame.throttle(), scale);
            vehicle.apply_motor_speeds(mix.left, mix.right);
        }
        Err(e) => warn!(instance, "dropping malformed actuator frame: {e}"),
    }
}

/// Throttled to roughly every `interval_s` of simulated time. Send failures
/// are swallowed: telemetry must never stall the physics loop.
fn send_range(
    relay: &mut Option<DistanceRelay>,
    vehicle: &mut dyn SimVehicle,
    last_sent_s: &mut f64,
    interval_s: f64,
    instance: u16,
) {
    let now_s = vehicle.sim_time_s();
    if now_s - *last_sent_s < interval_s {
        return;
    }
    let Some(sample) = vehicle.read_range() else {
        return;
    };
    *last_sent_s = now_s;

    if let Some(relay) = relay {
        let reading = DistanceSensorReading::from_sample(&sample);
        let time_boot_ms = (now_s * 1000.0) as u32;
        if let Err(e) = relay.send(&reading, time_boot_ms) {
            debug!(instance, "distance telemetry send failed: {e}");
        }
    }
}

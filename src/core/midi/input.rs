use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection, MidiInputPort};

use super::mapping::{ControlMapping, Decoded};
use crate::core::synth::EngineHandle;
use crate::messaging::EnqueueError;

const CLIENT_NAME: &str = "rhosy MIDI input";

/// Live connection from a MIDI input port to an engine's event queue
pub struct MidiInputHandler {
    connection: Option<MidiInputConnection<()>>,
    port_name: String,
}

impl MidiInputHandler {
    /// Names of all MIDI input ports currently visible
    pub fn list_ports() -> Result<Vec<String>> {
        let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to initialize MIDI input")?;
        let names = midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect();
        Ok(names)
    }

    /// Connect to the port called `port_name`, or the first port if `None`.
    ///
    /// Decoded events go to `engine`; a stop control sends `()` on `stop`.
    pub fn connect(
        port_name: Option<&str>,
        engine: EngineHandle,
        mapping: ControlMapping,
        stop: Sender<()>,
    ) -> Result<Self> {
        let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to initialize MIDI input")?;
        let (port, name) = find_port(&midi_in, port_name)?;

        let connection = midi_in
            .connect(
                &port,
                "rhosy-read-input",
                move |_stamp, message, _| {
                    handle_message(message, &mapping, &engine, &stop);
                },
                (),
            )
            .map_err(|err| anyhow!("Failed to connect to MIDI port '{}': {}", name, err))?;

        log::info!(target: "rhosy::midi", "listening on MIDI port '{}'", name);
        Ok(Self {
            connection: Some(connection),
            port_name: name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            log::info!(target: "rhosy::midi", "closed MIDI port '{}'", self.port_name);
        }
    }
}

impl Drop for MidiInputHandler {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn find_port(midi_in: &MidiInput, wanted: Option<&str>) -> Result<(MidiInputPort, String)> {
    let mut ports = midi_in
        .ports()
        .into_iter()
        .filter_map(|port| midi_in.port_name(&port).ok().map(|name| (port, name)));

    match wanted {
        Some(wanted) => ports
            .find(|(_, name)| name == wanted)
            .ok_or_else(|| anyhow!("MIDI port '{}' not found", wanted)),
        None => ports.next().ok_or_else(|| anyhow!("No MIDI input ports available")),
    }
}

/// Decode one message and route it to the engine or the stop channel
pub(crate) fn handle_message(
    message: &[u8],
    mapping: &ControlMapping,
    engine: &EngineHandle,
    stop: &Sender<()>,
) {
    match mapping.decode(message) {
        Decoded::Event(event) => match engine.enqueue(event) {
            Ok(()) => {}
            Err(EnqueueError::Full(event)) => {
                log::warn!(
                    target: "rhosy::midi",
                    "event queue full, dropped {:?} ({} dropped so far)",
                    event,
                    engine.events_dropped()
                );
            }
            Err(EnqueueError::Disconnected(event)) => {
                log::warn!(target: "rhosy::midi", "engine gone, dropped {:?}", event);
            }
        },
        Decoded::Stop => {
            // A second stop while the first is pending changes nothing
            let _ = stop.try_send(());
        }
        Decoded::Ignored(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::synth::{Engine, EngineConfig};
    use crate::messaging::Key;

    #[test]
    fn messages_reach_the_engine() {
        let mut engine = Engine::with_config(EngineConfig::default()).unwrap();
        let handle = engine.handle();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let mapping = ControlMapping::default();

        handle_message(&[0xB0, 64, 127], &mapping, &handle, &stop_tx);
        handle_message(&[0x90, 60, 90], &mapping, &handle, &stop_tx);
        handle_message(&[0xE0, 0, 64], &mapping, &handle, &stop_tx);
        engine.process(16);

        assert!(engine.is_sustaining());
        assert!(engine.voice(Key::new(60).unwrap()).is_some());
        assert!(stop_rx.try_recv().is_err());
    }

    #[test]
    fn stop_control_signals_once() {
        let engine = Engine::with_config(EngineConfig::default()).unwrap();
        let handle = engine.handle();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let mapping = ControlMapping::default();

        handle_message(&[0xB0, 23, 127], &mapping, &handle, &stop_tx);
        handle_message(&[0xB0, 23, 0], &mapping, &handle, &stop_tx);
        assert!(stop_rx.try_recv().is_ok());
        assert!(stop_rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_without_panicking() {
        let config = EngineConfig {
            queue_capacity: 1,
            ..EngineConfig::default()
        };
        let engine = Engine::with_config(config).unwrap();
        let handle = engine.handle();
        let (stop_tx, _stop_rx) = crossbeam_channel::bounded(1);
        let mapping = ControlMapping::default();

        handle_message(&[0x90, 60, 90], &mapping, &handle, &stop_tx);
        handle_message(&[0x90, 62, 90], &mapping, &handle, &stop_tx);
        assert_eq!(handle.events_dropped(), 1);
    }
}

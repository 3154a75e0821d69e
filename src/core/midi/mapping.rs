use serde::{Deserialize, Serialize};

use crate::messaging::{Event, Key};

/// Which controller numbers carry the keyboard's special functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlMapping {
    /// Sustain pedal; values >= 64 mean down
    pub sustain_cc: u8,
    /// Transport "stop" key that shuts the instrument down
    pub stop_cc: Option<u8>,
    /// Program-select keys; recognized and logged, no sound change
    pub program_ccs: Vec<u8>,
}

impl Default for ControlMapping {
    fn default() -> Self {
        // Oxygen 8 transport keys: 21 rewind, 22 fast-forward, 23 stop
        Self {
            sustain_cc: 64,
            stop_cc: Some(23),
            program_ccs: vec![21, 22],
        }
    }
}

/// Input the decoder recognized but the engine does not use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
    ProgramKey { control: u8, value: u8 },
    Control { control: u8, value: u8 },
    /// Signed offset from center, -8192..=8191
    PitchBend(i16),
    Other(Vec<u8>),
}

/// Result of decoding one raw MIDI message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Event(Event),
    Stop,
    Ignored(Ignored),
}

impl ControlMapping {
    /// Decode one raw MIDI message.
    ///
    /// Channel is ignored. Note-on with velocity 0 becomes a note-off, so the
    /// engine never sees velocity.
    pub fn decode(&self, message: &[u8]) -> Decoded {
        let ignored = || Decoded::Ignored(Ignored::Other(message.to_vec()));
        let (status, data1, data2) = match message {
            [status, data1, data2, ..] => (status & 0xF0, *data1, *data2),
            _ => {
                log::info!(target: "rhosy::midi", "unknown MIDI message {:02X?}", message);
                return ignored();
            }
        };

        match status {
            0x80 => {
                let key = Key::from_data_byte(data1);
                log::debug!(target: "rhosy::notes", "note off {} velocity {}", key, data2);
                Decoded::Event(Event::NoteOff { key })
            }
            0x90 => {
                let key = Key::from_data_byte(data1);
                if data2 == 0 {
                    log::debug!(target: "rhosy::notes", "note off {} (note on, velocity 0)", key);
                    Decoded::Event(Event::NoteOff { key })
                } else {
                    log::debug!(
                        target: "rhosy::notes",
                        "note on {} velocity {} ({:.2})",
                        key,
                        data2,
                        data2 as f32 / 127.0
                    );
                    Decoded::Event(Event::NoteOn { key })
                }
            }
            0xB0 => self.decode_control(data1, data2),
            0xE0 => {
                let raw = ((data2 as i16 & 0x7F) << 7) | (data1 as i16 & 0x7F);
                let bend = raw - 8192;
                log::info!(target: "rhosy::midi", "pitchwheel {} ignored", bend);
                Decoded::Ignored(Ignored::PitchBend(bend))
            }
            _ => {
                log::info!(target: "rhosy::midi", "unknown MIDI message {:02X?}", message);
                ignored()
            }
        }
    }

    fn decode_control(&self, control: u8, value: u8) -> Decoded {
        if control == self.sustain_cc {
            let on = value >= 64;
            log::debug!(target: "rhosy::notes", "sustain {}", if on { "on" } else { "off" });
            Decoded::Event(Event::SustainChange { on })
        } else if Some(control) == self.stop_cc {
            log::info!(target: "rhosy::midi", "stop");
            Decoded::Stop
        } else if self.program_ccs.contains(&control) {
            log::info!(target: "rhosy::midi", "program key {} ignored", control);
            Decoded::Ignored(Ignored::ProgramKey { control, value })
        } else {
            log::info!(target: "rhosy::midi", "control {} value {} ignored", control, value);
            Decoded::Ignored(Ignored::Control { control, value })
        }
    }
}

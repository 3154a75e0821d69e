/// Convert a MIDI note number to its frequency in Hz
pub fn midi_note_to_freq(note: u8) -> f64 {
    // A4 (note 69) is 440 Hz
    440.0 * 2.0f64.powf((note as f64 - 69.0) / 12.0)
}

/// Convert a time in milliseconds to a (fractional) sample count
pub fn ms_to_samples(time_ms: f32, sample_rate: u32) -> f64 {
    time_ms as f64 * sample_rate as f64 / 1000.0
}

/// Calculate decibels from a linear amplitude value
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    // Avoid log of zero
    if amplitude <= 0.0 {
        -96.0 // Minimum dB value (near silence)
    } else {
        20.0 * amplitude.log10()
    }
}

/// Format a time value with appropriate unit suffix (ms, s)
pub fn format_time(time_in_seconds: f32) -> String {
    if time_in_seconds >= 1.0 {
        format!("{:.2} s", time_in_seconds)
    } else {
        format!("{:.0} ms", time_in_seconds * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert_eq!(midi_note_to_freq(69), 440.0);
        assert!((midi_note_to_freq(81) - 880.0).abs() < 1e-9);
        assert!((midi_note_to_freq(60) - 261.625_565).abs() < 1e-3);
    }

    #[test]
    fn ms_conversion() {
        assert_eq!(ms_to_samples(10.0, 48_000), 480.0);
        assert_eq!(ms_to_samples(100.0, 48_000), 4800.0);
    }

    #[test]
    fn db_floor() {
        assert_eq!(amplitude_to_db(0.0), -96.0);
        assert!(amplitude_to_db(1.0).abs() < 1e-6);
    }

    #[test]
    fn time_formatting() {
        assert_eq!(format_time(0.25), "250 ms");
        assert_eq!(format_time(1.5), "1.50 s");
    }
}

//! poise-speech — Text-to-speech for interviewer characters.

pub mod murf;

pub use murf::{MurfConfig, MurfService, SpeechError, SpeechRequest, VoicePreset};

//! Wake-phrase gating
//!
//! Every transcript passes through the gate; only those containing a
//! configured trigger phrase are routed onward. Matching is a
//! case-insensitive substring scan, which lets the trigger lists absorb
//! common transcription slips ("chet", " het ") without a grammar.

use crate::config::TriggerConfig;

/// Destination for a gated transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Hardware command for the flip-up lenses
    Glasses,
    /// Conversational request for the assistant
    Chat,
}

/// Routes transcripts by trigger phrase
pub struct WakeGate {
    glasses: Vec<String>,
    chat: Vec<String>,
}

impl WakeGate {
    /// Build a gate from configured trigger lists
    #[must_use]
    pub fn new(config: &TriggerConfig) -> Self {
        Self {
            glasses: lowercase_all(&config.glasses),
            chat: lowercase_all(&config.chat),
        }
    }

    /// Route a transcript, or `None` when no trigger matches
    ///
    /// Categories are checked in a fixed order with glasses first, so a
    /// request that happens to contain phrases from both lists always
    /// reaches the hardware path.
    #[must_use]
    pub fn route(&self, transcript: &str) -> Option<Route> {
        let text = transcript.to_lowercase();

        if contains_any(&self.glasses, &text) {
            return Some(Route::Glasses);
        }
        if contains_any(&self.chat, &text) {
            return Some(Route::Chat);
        }
        None
    }
}

fn lowercase_all(triggers: &[String]) -> Vec<String> {
    triggers.iter().map(|t| t.to_lowercase()).collect()
}

fn contains_any(triggers: &[String], text: &str) -> bool {
    triggers.iter().any(|t| text.contains(t.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> WakeGate {
        WakeGate::new(&TriggerConfig::default())
    }

    #[test]
    fn chat_trigger_routes_to_chat() {
        assert_eq!(gate().route("hey chat, what time is it"), Some(Route::Chat));
    }

    #[test]
    fn glasses_trigger_routes_to_glasses() {
        assert_eq!(gate().route("put the glasses down"), Some(Route::Glasses));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(gate().route("Hey Chat, hello"), Some(Route::Chat));
        assert_eq!(gate().route("GLASSES UP"), Some(Route::Glasses));
    }

    #[test]
    fn glasses_wins_when_both_categories_match() {
        assert_eq!(
            gate().route("chat, flip the glasses up please"),
            Some(Route::Glasses)
        );
    }

    #[test]
    fn misheard_variants_still_match() {
        assert_eq!(gate().route("hey chet, how are you"), Some(Route::Chat));
        assert_eq!(gate().route("lower the classes"), Some(Route::Glasses));
        assert_eq!(gate().route("i like that hat."), Some(Route::Chat));
    }

    #[test]
    fn unrelated_speech_is_dropped() {
        assert_eq!(gate().route("just talking to myself here"), None);
        assert_eq!(gate().route(""), None);
    }

    #[test]
    fn hat_needs_its_delimiters() {
        // Bare "hat" inside a word is not in the trigger list
        assert_eq!(gate().route("she hatched a plan"), None);
        assert_eq!(gate().route("top-hat style"), Some(Route::Chat));
    }
}

use crate::rules::{Sender, SenderMatch, sender_match_reason};
use crate::store::SampledMessage;

/// One sample draw with each message's sender parsed once.
#[derive(Debug, Clone, Default)]
pub(crate) struct SampleDraw {
    pub size: usize,
    senders: Vec<Sender>,
}

impl SampleDraw {
    pub fn from_messages(messages: &[SampledMessage]) -> Self {
        Self {
            size: messages.len(),
            senders: messages
                .iter()
                .filter_map(|message| message.sender_email.as_deref())
                .filter_map(Sender::parse)
                .collect(),
        }
    }

    /// Senders in the draw covered by a condition.
    pub fn hits(&self, matcher: &SenderMatch) -> usize {
        self.senders
            .iter()
            .filter(|sender| sender_match_reason(matcher, sender).is_some())
            .count()
    }
}

/// Draws for both audiences. Label rules read the whole inbox, assignee rules
/// only what is still unassigned.
#[derive(Debug, Clone, Default)]
pub(crate) struct Samples {
    pub label: Option<SampleDraw>,
    pub assignee: Option<SampleDraw>,
}

//! Situational context for replies
//!
//! Optional facts gathered just before each model call: what the camera
//! currently sees and what is coming up on the calendar. Both sources are
//! best-effort; a failure leaves its slot empty and the reply proceeds
//! without it.

pub mod calendar;
pub mod sight;

pub use calendar::CalendarClient;
pub use sight::SightSource;

/// Auxiliary facts merged into a reply prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SituationalContext {
    /// Labels for objects currently in view, empty when sight is
    /// unavailable
    pub objects: Vec<String>,
    /// Upcoming calendar event summaries, empty when the calendar is
    /// unavailable
    pub events: Vec<String>,
}

/// Gathers situational context from whichever sources are enabled
#[derive(Default)]
pub struct ContextSources {
    sight: Option<SightSource>,
    calendar: Option<CalendarClient>,
}

impl ContextSources {
    /// Create an empty source set; `gather` returns default context until
    /// sources are attached
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a camera-backed sight source
    #[must_use]
    pub fn with_sight(mut self, sight: SightSource) -> Self {
        self.sight = Some(sight);
        self
    }

    /// Attach a calendar client
    #[must_use]
    pub fn with_calendar(mut self, calendar: CalendarClient) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Collect context from every attached source
    ///
    /// Source errors are logged and degrade to an empty slot; this never
    /// fails and never blocks a reply on broken hardware.
    pub async fn gather(&self) -> SituationalContext {
        let objects = match &self.sight {
            Some(sight) => match sight.observe().await {
                Ok(labels) => labels,
                Err(e) => {
                    tracing::warn!(error = %e, "sight unavailable");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let events = match &self.calendar {
            Some(calendar) => match calendar.upcoming_events().await {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(error = %e, "calendar unavailable");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        SituationalContext { objects, events }
    }
}

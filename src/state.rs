// Copyright 2026 Commander project contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use crate::error::CommanderError;

/// Lifecycle state of a [`crate::Node`] (spec.md §3).
///
/// Completion is monotonic: once a node reaches one of the three terminal
/// states, its state never changes again (invariant 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Running,
    Done,
    Failed,
    Terminated,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Failed | State::Terminated)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Pending => "pending",
            State::Running => "running",
            State::Done => "done",
            State::Failed => "failed",
            State::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// The seven lifecycle events a [`crate::callback::CallbackRegistry`] can
/// dispatch on, in the fixed order spec.md §4.4 lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    JobStart,
    HandlerStart,
    Exception,
    Terminate,
    JobEnd,
    HandlerEnd,
    CommanderEnd,
}

impl Event {
    pub const ALL: [Event; 7] = [
        Event::JobStart,
        Event::HandlerStart,
        Event::Exception,
        Event::Terminate,
        Event::JobEnd,
        Event::HandlerEnd,
        Event::CommanderEnd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Event::JobStart => "at_job_start",
            Event::HandlerStart => "at_handler_start",
            Event::Exception => "at_exception",
            Event::Terminate => "at_terminate",
            Event::JobEnd => "at_job_end",
            Event::HandlerEnd => "at_handler_end",
            Event::CommanderEnd => "at_commander_end",
        }
    }

    /// Parses a lifecycle event by its conventional string name, for the
    /// dynamic-descriptor registration path spec.md's Design Notes describe.
    pub fn parse(name: &str) -> Result<Self, CommanderError> {
        Event::ALL
            .into_iter()
            .find(|e| e.name() == name)
            .ok_or_else(|| CommanderError::InvalidCallbackEvent {
                name: name.to_owned(),
            })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!State::Pending.is_terminal());
        assert!(!State::Running.is_terminal());
        assert!(State::Done.is_terminal());
        assert!(State::Failed.is_terminal());
        assert!(State::Terminated.is_terminal());
    }

    #[test]
    fn event_name_roundtrips_through_parse() {
        for event in Event::ALL {
            assert_eq!(Event::parse(event.name()).unwrap(), event);
        }
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let err = Event::parse("at_nonsense").unwrap_err();
        assert!(matches!(err, CommanderError::InvalidCallbackEvent { .. }));
    }
}

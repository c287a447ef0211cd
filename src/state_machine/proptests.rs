//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::flow::{Command, Flow, Param};
use super::state::*;
use super::transition::*;
use super::*;
use proptest::prelude::*;
use std::path::PathBuf;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> SessionContext {
    SessionContext::new(
        UserIdentity {
            id: 7,
            username: Some("prop".into()),
            first_name: "Prop".into(),
        },
        70,
        None,
        20,
    )
}

fn stored(name: &str) -> Event {
    Event::UploadStored(UploadedFile {
        path: PathBuf::from("/cache").join(name),
        original_name: name.to_string(),
    })
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_flow() -> impl Strategy<Value = Flow> {
    proptest::sample::select(Flow::ALL.to_vec())
}

fn arb_file_name() -> impl Strategy<Value = String> {
    ("[a-z]{1,8}", prop_oneof![Just("txt"), Just("xlsx"), Just("vcf"), Just("pdf")])
        .prop_map(|(stem, ext)| format!("{stem}.{ext}"))
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_flow().prop_map(|f| Event::Command(Command::Begin(f))),
        Just(Event::Command(Command::Done)),
        Just(Event::Command(Command::Start)),
        "[a-zA-Z0-9 ]{0,20}".prop_map(Event::Text),
        "[0-9]{8,12}".prop_map(Event::Text),
        arb_file_name().prop_map(|name| Event::Document {
            file_id: format!("id-{name}"),
            file_name: name,
            forwarded_from: None,
        }),
        arb_file_name().prop_map(|name| stored(&name)),
        Just(Event::JobFinished(JobOutcome::Completed)),
    ]
}

/// A session reached by replaying arbitrary events from idle.
fn arb_state() -> impl Strategy<Value = SessionState> {
    proptest::collection::vec(arb_event(), 0..12).prop_map(|events| {
        let ctx = test_context();
        let mut state = SessionState::Idle;
        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                state = result.new_state;
            }
        }
        state
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Starting a flow drops every upload the session owned
    #[test]
    fn flow_start_discards_prior_uploads(state in arb_state(), flow in arb_flow()) {
        let owned = state.upload_paths();
        let result = transition(&state, &test_context(), Event::Command(Command::Begin(flow))).unwrap();

        let discarded: Vec<PathBuf> = result
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::DiscardUploads(paths) => Some(paths.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        prop_assert_eq!(discarded, owned);
        prop_assert_eq!(result.new_state.active_flow(), Some(flow));
        prop_assert!(result.new_state.upload_paths().is_empty());
    }

    /// Every upload path leaving a session is discarded exactly once
    #[test]
    fn uploads_are_never_dropped_silently(state in arb_state(), event in arb_event()) {
        // Once executing, the running job owns the uploads
        let executing = matches!(
            &state,
            SessionState::Active(ActiveFlow { stage: Stage::Executing, .. })
        );
        let before = if executing { Vec::new() } else { state.upload_paths() };
        if let Ok(result) = transition(&state, &test_context(), event) {
            let after = result.new_state.upload_paths();
            let mut discarded = Vec::new();
            for effect in &result.effects {
                match effect {
                    Effect::DiscardUploads(paths) => discarded.extend(paths.iter().cloned()),
                    Effect::Execute(job) => discarded.extend(job.files().iter().map(|f| f.path.clone())),
                    _ => {}
                }
            }
            for path in before {
                prop_assert!(
                    after.contains(&path) || discarded.contains(&path),
                    "{path:?} left the session without being discarded"
                );
            }
        }
    }

    /// A rejected answer never moves the prompt cursor
    #[test]
    fn invalid_part_count_keeps_cursor(garbage in "[a-z]{1,6}|0|-[0-9]{1,3}") {
        let ctx = test_context();
        let mut state = SessionState::Idle;
        for event in [
            Event::Command(Command::Begin(Flow::Split)),
            Event::Document { file_id: "f".into(), file_name: "a.txt".into(), forwarded_from: None },
            stored("a.txt"),
            Event::Command(Command::Done),
        ] {
            state = transition(&state, &ctx, event).unwrap().new_state;
        }
        let result = transition(&state, &ctx, Event::Text(garbage)).unwrap();
        prop_assert_eq!(&result.new_state, &state);
        prop_assert_eq!(
            result.effects,
            vec![Effect::reply(Param::PartCount.parse("x").unwrap_err())]
        );
    }

    /// Format error is reported at most once per flow
    #[test]
    fn format_error_reported_once(flow in arb_flow(), names in proptest::collection::vec(arb_file_name(), 1..8)) {
        let ctx = test_context();
        let mut state = transition(&SessionState::Idle, &ctx, Event::Command(Command::Begin(flow)))
            .unwrap()
            .new_state;
        let mut error_replies = 0;
        for name in names {
            let event = Event::Document { file_id: "f".into(), file_name: name.clone(), forwarded_from: None };
            if let Ok(result) = transition(&state, &ctx, event) {
                error_replies += result
                    .effects
                    .iter()
                    .filter(|e| matches!(e, Effect::Reply(text) if text == SAME_FORMAT || text.starts_with("Unsupported")))
                    .count();
                state = result.new_state;
                if result.effects.iter().any(|e| matches!(e, Effect::StoreUpload { .. })) {
                    state = transition(&state, &ctx, stored(&name)).unwrap().new_state;
                }
            }
        }
        prop_assert!(error_replies <= 1);
    }

    /// Merge never holds uploads of two formats
    #[test]
    fn merge_batch_is_homogeneous(names in proptest::collection::vec(arb_file_name(), 1..8)) {
        let ctx = test_context();
        let mut state = transition(&SessionState::Idle, &ctx, Event::Command(Command::Begin(Flow::Merge)))
            .unwrap()
            .new_state;
        for name in names {
            let event = Event::Document { file_id: "f".into(), file_name: name.clone(), forwarded_from: None };
            if let Ok(result) = transition(&state, &ctx, event) {
                let accepted = result.effects.iter().any(|e| matches!(e, Effect::StoreUpload { .. }));
                state = result.new_state;
                if accepted {
                    state = transition(&state, &ctx, stored(&name)).unwrap().new_state;
                }
            }
        }
        if let SessionState::Active(active) = &state {
            let mut formats: Vec<_> = active.uploads.iter().filter_map(UploadedFile::format).collect();
            formats.dedup();
            prop_assert!(formats.len() <= 1);
        }
    }
}

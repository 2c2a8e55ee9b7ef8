//! Integration tests: submessage replay pipeline (history → host → widget → view).
//!
//! Covers:
//!   - Hijack rejection when the setup is not from the message author
//!   - Numeric id ordering ("10" after "9")
//!   - Late-join replay equivalence with live, one-at-a-time delivery
//!   - Overlap between replayed history and live delivery
//!   - Unknown and retired widget types
//!   - Config loaded from disk flowing into activation

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use widgets_core::widget::{PollView, TodoView};
use widgets_core::{
    ErrorCode, HostingMessage, MessageId, NullSink, Outbound, PollAction, PollKey, ReplayError,
    SenderId, Submessage, TaskKey, TodoAction, UserDirectory, UserId, WidgetConfig, WidgetHost,
    WidgetView, load_config,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const AUTHOR: UserId = UserId(5);
const MSG: MessageId = MessageId(900);

fn message() -> HostingMessage {
    HostingMessage {
        id: MSG,
        sender_id: AUTHOR,
    }
}

fn people() -> Rc<dyn UserDirectory> {
    let mut names = BTreeMap::new();
    names.insert(UserId(5), "Olga".to_string());
    names.insert(UserId(7), "Alice".to_string());
    names.insert(UserId(8), "Bob".to_string());
    Rc::new(names)
}

fn host_for(user: UserId) -> WidgetHost {
    WidgetHost::new(user, WidgetConfig::default(), people())
}

fn discard() -> Outbound {
    Box::new(|_| {})
}

fn sub(id: u64, sender: u64, content: &str) -> Submessage {
    Submessage::widget(id, UserId(sender), content)
}

fn poll_view(host: &WidgetHost) -> PollView {
    match host.view(MSG) {
        Some(WidgetView::Poll(view)) => view,
        other => panic!("expected poll view, got {other:?}"),
    }
}

fn todo_view(host: &WidgetHost) -> TodoView {
    match host.view(MSG) {
        Some(WidgetView::Todo(view)) => view,
        other => panic!("expected todo view, got {other:?}"),
    }
}

/// A poll history with ids crossing a digit boundary.
fn poll_history() -> Vec<Submessage> {
    vec![
        sub(
            8,
            5,
            r#"{"widget_type":"poll","extra_data":{"question":"Lunch?","options":["Pizza"]}}"#,
        ),
        sub(9, 7, r#"{"type":"new_option","idx":0,"option":"Tacos"}"#),
        sub(10, 8, r#"{"type":"vote","key":"7,0","vote":1}"#),
        sub(11, 5, r#"{"type":"vote","key":"7,0","vote":1}"#),
        sub(12, 7, r#"{"type":"question","question":"Dinner?"}"#),
        sub(13, 8, r#"{"type":"vote","key":"canned,0","vote":1}"#),
        sub(14, 8, r#"{"type":"vote","key":"canned,0","vote":-1}"#),
        sub(15, 5, r#"{"type":"question","question":"Brunch?"}"#),
    ]
}

// ---------------------------------------------------------------------------
// Hijack
// ---------------------------------------------------------------------------

#[test]
fn setup_from_non_author_is_a_hijack() {
    let mut host = host_for(UserId(8));
    let err = host
        .process_submessages(
            message(),
            [sub(1, 7, r#"{"widget_type":"poll"}"#)],
            Box::new(NullSink),
            discard(),
        )
        .unwrap_err();
    assert_eq!(
        err,
        ReplayError::Hijack {
            message_id: MSG,
            claimed: UserId(7),
            author: AUTHOR,
        }
    );
    assert_eq!(err.to_string(), "User 7 tried to hijack message 900");
    assert!(host.view(MSG).is_none());
}

#[test]
fn hijack_check_uses_numeric_order() {
    // Lexically "10" < "9", so a string sort would pick the forged setup.
    let mut host = host_for(UserId(8));
    let result = host.process_submessages(
        message(),
        [
            sub(10, 7, r#"{"widget_type":"todo"}"#),
            sub(9, 5, r#"{"widget_type":"poll"}"#),
        ],
        Box::new(NullSink),
        discard(),
    );
    let report = result.expect("author's setup comes first numerically");
    // The forged setup is replayed as an ordinary poll event and rejected.
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].code, ErrorCode::MalformedPayload);
    assert!(matches!(host.view(MSG), Some(WidgetView::Poll(_))));
}

// ---------------------------------------------------------------------------
// Ordering and replay equivalence
// ---------------------------------------------------------------------------

#[test]
fn shuffled_history_replays_in_id_order() {
    let mut ordered = host_for(UserId(8));
    ordered
        .process_submessages(message(), poll_history(), Box::new(NullSink), discard())
        .expect("activates");

    let mut shuffled_history = poll_history();
    shuffled_history.reverse();
    let mut shuffled = host_for(UserId(8));
    shuffled
        .process_submessages(message(), shuffled_history, Box::new(NullSink), discard())
        .expect("activates");

    assert_eq!(poll_view(&ordered), poll_view(&shuffled));
}

#[test]
fn late_join_matches_live_delivery() {
    let history = poll_history();

    let mut live = host_for(UserId(8));
    let setup = history[..1].to_vec();
    live.process_submessages(message(), setup, Box::new(NullSink), discard())
        .expect("activates");
    for event in &history[1..] {
        live.handle_event(MSG, event.clone()).expect("active");
    }

    let mut late = host_for(UserId(8));
    late.process_submessages(message(), history, Box::new(NullSink), discard())
        .expect("activates");

    let view = poll_view(&late);
    assert_eq!(view, poll_view(&live));

    assert_eq!(view.question, "Brunch?");
    let tacos = &view.options[1];
    assert_eq!(tacos.option, "Tacos");
    assert_eq!(tacos.key, "7,0");
    assert_eq!(tacos.count, 2);
    assert_eq!(tacos.names, "Olga, Bob");
    assert!(tacos.current_user_voted);
    assert_eq!(view.options[0].count, 0);
}

#[test]
fn overlapping_live_delivery_is_not_applied_twice() {
    let history = vec![
        sub(1, 5, r#"{"widget_type":"todo","extra_data":{"tasks":[{"task":"Milk","desc":""}]}}"#),
        sub(2, 8, r#"{"type":"strike","key":"0,canned"}"#),
    ];
    let mut host = host_for(UserId(8));
    host.process_submessages(message(), history.clone(), Box::new(NullSink), discard())
        .expect("activates");
    assert!(todo_view(&host).tasks[0].completed);

    // The strike arrives again on the live channel; a second toggle would
    // un-complete the task.
    let report = host.handle_events(MSG, history).expect("active");
    assert_eq!(report.total(), 0);
    assert!(todo_view(&host).tasks[0].completed);
}

#[test]
fn own_device_reconciliation_through_the_host() {
    let posted = Rc::new(RefCell::new(Vec::new()));
    let out = Rc::clone(&posted);
    let mut host = host_for(UserId(8));
    host.process_submessages(
        message(),
        [sub(1, 5, r#"{"widget_type":"poll"}"#)],
        Box::new(NullSink),
        Box::new(move |s| out.borrow_mut().push(s)),
    )
    .expect("activates");

    // Another device of user 8 created option 5.
    let soup = sub(2, 8, r#"{"type":"new_option","idx":5,"option":"Soup"}"#);
    host.handle_event(MSG, soup).expect("active");

    host.perform(MSG, &PollAction::AddOption("Salad".into()).into())
        .expect("active")
        .expect("valid option");
    let posted = posted.borrow();
    assert_eq!(
        posted[0].content,
        r#"{"type":"new_option","idx":6,"option":"Salad"}"#
    );
    assert_eq!(
        poll_view(&host).options[0].key,
        PollKey::new(SenderId::User(UserId(8)), 5).to_string()
    );
}

#[test]
fn todo_strike_via_perform_and_echo() {
    let posted = Rc::new(RefCell::new(Vec::new()));
    let out = Rc::clone(&posted);
    let setup = serde_json::json!({
        "widget_type": "todo",
        "extra_data": {"task_list_title": "Chores", "tasks": [{"task": "Mop", "desc": "floor"}]},
    });
    let mut host = host_for(UserId(8));
    host.process_submessages(
        message(),
        [sub(1, 5, &setup.to_string())],
        Box::new(NullSink),
        Box::new(move |s| out.borrow_mut().push(s)),
    )
    .expect("activates");

    let key = TaskKey::new(0, SenderId::Canned);
    host.perform(MSG, &TodoAction::Strike(key).into())
        .expect("active")
        .expect("known task");
    let content = posted.borrow()[0].content.clone();
    assert_eq!(content, r#"{"type":"strike","key":"0,canned"}"#);

    host.handle_event(MSG, sub(2, 8, &content)).expect("active");
    let view = todo_view(&host);
    assert_eq!(view.title, "Chores");
    assert!(view.tasks[0].completed);

    // Non-owners cannot even produce a title change.
    let nothing = host
        .perform(MSG, &TodoAction::SetTitle("Mine".into()).into())
        .expect("active")
        .expect("valid");
    assert!(nothing.is_none());
}

// ---------------------------------------------------------------------------
// Widget types and config
// ---------------------------------------------------------------------------

#[test]
fn unknown_and_retired_types_render_nothing() {
    let mut host = host_for(UserId(8));
    for widget_type in ["tictactoe", "chess"] {
        let content = format!(r#"{{"widget_type":"{widget_type}"}}"#);
        let setup = [sub(1, 5, &content)];
        let err = host
            .process_submessages(message(), setup, Box::new(NullSink), discard())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownWidgetType);
        let retired = matches!(&err, ReplayError::Retired(t) if t == "tictactoe");
        assert_eq!(retired, widget_type == "tictactoe", "{err:?}");
        assert!(host.view(MSG).is_none());
    }
}

#[test]
fn config_file_drives_activation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("widgets.toml");
    std::fs::write(
        &path,
        "max_idx = 3\ndefault_task_list_title = \"Liste\"\nretired_widget_types = []\n",
    )
    .expect("write config");
    let config = load_config(&path).expect("load");

    let mut host = WidgetHost::new(UserId(8), config, people());
    let report = host
        .process_submessages(
            message(),
            [
                sub(1, 5, r#"{"widget_type":"todo"}"#),
                sub(2, 8, r#"{"type":"new_task","key":3,"task":"a","desc":"","completed":false}"#),
                sub(3, 8, r#"{"type":"new_task","key":4,"task":"b","desc":"","completed":false}"#),
            ],
            Box::new(NullSink),
            discard(),
        )
        .expect("activates");
    assert_eq!(report.applied, 1);
    assert_eq!(report.rejected[0].code, ErrorCode::IndexOutOfRange);
    assert_eq!(todo_view(&host).title, "Liste");
}

//! Integration tests for the memory system: persistence across restarts,
//! per-user serialisation and the summarisation cycle end to end.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;

use zaban_bot::config::{Config, MemoryConfig};
use zaban_bot::error::FetchError;
use zaban_bot::llm::providers::dummy::{DummyBehaviour, DummyProvider};
use zaban_bot::llm::{CompletionError, LlmProvider};
use zaban_bot::prompts::Prompts;
use zaban_bot::subsystems::chat::ChatService;
use zaban_bot::subsystems::feeds::pick_fresh;
use zaban_bot::subsystems::memory::{ConversationState, MemorySystem, Turn, TurnRole};

// ── helpers ──────────────────────────────────────────────────────────────────

fn open(tmp: &TempDir, dummy: &DummyProvider, memory: MemoryConfig) -> (Arc<MemorySystem>, ChatService) {
    let mut cfg = Config::test_default(tmp.path());
    cfg.memory = memory;
    let llm = LlmProvider::Dummy(dummy.clone());
    let prompts = Prompts::default();
    let mem = Arc::new(MemorySystem::open(&cfg, llm.clone(), &prompts).expect("open memory"));
    let chat = ChatService::new(mem.clone(), llm, prompts, &cfg.llm);
    (mem, chat)
}

fn url(s: &String) -> &str {
    s.as_str()
}

fn small() -> MemoryConfig {
    MemoryConfig { context_window: 4, summary_trigger: 6, keep_after_summary: 2 }
}

// ── persistence ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let dummy = DummyProvider::echo();
    {
        let (mem, chat) = open(&tmp, &dummy, MemoryConfig::default());
        chat.ask("alice", "hi").await.unwrap();
        chat.set_role("alice", "pirate").await;
        chat.set_trigger("alice", false);
        mem.reddit_seen().mark_seen("alice", "https://i.redd.it/1.jpg");
        mem.neodb_cache().set_cached("book:dune", &vec!["Dune"]);
    }

    let (mem, chat) = open(&tmp, &dummy, MemoryConfig::default());
    assert_eq!(
        mem.conversations().history("alice"),
        vec![Turn::user("hi"), Turn::assistant("[echo] hi")]
    );
    assert_eq!(mem.conversations().role("alice").as_deref(), Some("pirate"));
    assert!(chat.keyword_reply("alice", "咋办").is_none());
    assert_eq!(mem.reddit_seen().seen("alice"), vec!["https://i.redd.it/1.jpg"]);
    assert_eq!(mem.neodb_cache().get::<Vec<String>>("book:dune"), Some(vec!["Dune".to_string()]));
}

#[tokio::test]
async fn namespace_files_land_in_their_directories() {
    let tmp = TempDir::new().unwrap();
    let dummy = DummyProvider::echo();
    let (_mem, chat) = open(&tmp, &dummy, MemoryConfig::default());
    chat.ask("bob", "hello").await.unwrap();
    chat.set_role("bob", "cat").await;
    chat.set_trigger("bob", false);

    assert!(tmp.path().join("savedata/histories.json").is_file());
    assert!(tmp.path().join("config/roles.json").is_file());
    assert!(tmp.path().join("config/disabled_triggers.json").is_file());

    let raw = fs::read_to_string(tmp.path().join("savedata/histories.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["bob"][0]["role"], "user");
    assert_eq!(parsed["bob"][0]["content"], "hello");
}

#[tokio::test]
async fn corrupt_namespace_file_loads_empty() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("savedata")).unwrap();
    fs::write(tmp.path().join("savedata/histories.json"), "{ not json").unwrap();

    let dummy = DummyProvider::echo();
    let (mem, chat) = open(&tmp, &dummy, MemoryConfig::default());
    assert!(mem.conversations().history("carol").is_empty());
    chat.ask("carol", "still works").await.unwrap();
    assert_eq!(mem.conversations().history("carol").len(), 2);
}

// ── summarisation cycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn asks_trigger_summary_and_bound_history() {
    let tmp = TempDir::new().unwrap();
    let dummy = DummyProvider::echo();
    let (mem, chat) = open(&tmp, &dummy, small());

    // Each ask appends two turns; the third ask reaches T = 6.
    for i in 0..3 {
        chat.ask("dave", &format!("q{i}")).await.unwrap();
    }
    let conv = mem.conversations();
    assert_eq!(conv.history("dave").len(), 2);
    assert!(conv.summary("dave").is_some());
    // 3 chat calls + 1 summary call.
    assert_eq!(dummy.calls(), 4);

    let kept = conv.history("dave");
    assert_eq!(kept[0], Turn::user("q2"));
    assert_eq!(kept[1].role, TurnRole::Assistant);
}

#[tokio::test]
async fn failing_summary_keeps_history_and_retries_later() {
    let tmp = TempDir::new().unwrap();
    let dummy = DummyProvider::echo();
    let (mem, _chat) = open(&tmp, &dummy, small());
    let conv = mem.conversations();

    let session = conv.session("erin").await;
    for i in 0..5 {
        session.append_user_turn(&format!("m{i}")).await;
    }
    dummy.set_behaviour(DummyBehaviour::Fail(CompletionError::Upstream("HTTP 500".into())));
    session.append_assistant_turn("m5").await;
    assert_eq!(session.history().len(), 6);
    assert_eq!(session.summary(), None);
    assert_eq!(session.state(), ConversationState::Active);

    dummy.set_behaviour(DummyBehaviour::Reply("summary".into()));
    session.append_user_turn("m6").await;
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.summary().as_deref(), Some("summary"));
}

#[tokio::test]
async fn windowed_context_tracks_latest_turns() {
    let tmp = TempDir::new().unwrap();
    let dummy = DummyProvider::echo();
    let config = MemoryConfig { context_window: 3, summary_trigger: 100, keep_after_summary: 50 };
    let (mem, _chat) = open(&tmp, &dummy, config);
    let conv = mem.conversations();
    {
        let s = conv.session("fay").await;
        for i in 0..10 {
            s.append_user_turn(&i.to_string()).await;
        }
    }
    let window: Vec<String> = conv.windowed_context("fay").into_iter().map(|t| t.content).collect();
    assert_eq!(window, vec!["7", "8", "9"]);
}

// ── concurrency ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_asks_for_one_user_do_not_interleave() {
    let tmp = TempDir::new().unwrap();
    let dummy = DummyProvider::echo().with_delay(Duration::from_millis(10));
    let (mem, chat) = open(&tmp, &dummy, MemoryConfig::default());
    let chat = Arc::new(chat);

    let mut tasks = Vec::new();
    for i in 0..6 {
        let chat = chat.clone();
        tasks.push(tokio::spawn(async move { chat.ask("gus", &format!("q{i}")).await }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    let history = mem.conversations().history("gus");
    assert_eq!(history.len(), 12);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, TurnRole::User);
        assert_eq!(pair[1].content, format!("[echo] {}", pair[0].content));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_picks_share_one_fetch() {
    let tmp = TempDir::new().unwrap();
    let dummy = DummyProvider::echo();
    let (mem, _chat) = open(&tmp, &dummy, MemoryConfig::default());
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for user in ["u1", "u2", "u3", "u4"] {
        let (mem, fetches) = (mem.clone(), fetches.clone());
        tasks.push(tokio::spawn(async move {
            pick_fresh(
                &mem,
                mem.reddit_cache(),
                mem.reddit_seen(),
                user,
                "Floof",
                url,
                move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, FetchError>(vec!["https://i.redd.it/a.jpg".to_string()])
                },
            )
            .await
        }));
    }
    for t in tasks {
        assert_eq!(t.await.unwrap().unwrap(), "https://i.redd.it/a.jpg");
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(mem.reddit_seen().len("u1"), 1);
}

// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integration tests for concurrent dispatch across hosts.

mod common;

use common::{hosts, Behaviour, MockProvider};
use multissh::executor::{
    DispatchError, Dispatcher, HostOutcome, MemorySink, OutputLine, StreamKind,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn dispatcher(provider: &Arc<MockProvider>, sink: &MemorySink) -> Dispatcher {
    Dispatcher::new(provider.clone(), Arc::new(sink.clone()))
}

#[tokio::test]
async fn test_success_and_connect_failure() {
    let provider = Arc::new(MockProvider::new([
        ("h1", Behaviour::ok(&["ok"])),
        ("h2", Behaviour::ConnectFail("connection refused".into())),
    ]));
    let sink = MemorySink::new();

    let summary = dispatcher(&provider, &sink)
        .run(&hosts(&["h1", "h2"]), "echo ok")
        .await
        .unwrap();

    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.results[0].host.name(), "h1");
    assert_eq!(
        summary.results[0].outcome,
        HostOutcome::Completed {
            exit_status: Some(0)
        }
    );
    assert_eq!(summary.results[1].host.name(), "h2");
    assert!(matches!(
        &summary.results[1].outcome,
        HostOutcome::ConnectFailed(reason) if reason.contains("connection refused")
    ));

    assert_eq!(
        sink.lines(),
        vec![OutputLine::new(Arc::from("h1"), StreamKind::Stdout, "ok")]
    );
    assert_eq!(summary.exit_code(), 1);

    assert_eq!(provider.stats.closes("h1"), 1);
    assert_eq!(provider.stats.closes("h2"), 0);
}

#[tokio::test]
async fn test_all_lines_delivered_in_order() {
    let stdout: Vec<String> = (0..500).map(|i| format!("out line {i}")).collect();
    let stderr: Vec<String> = (0..300).map(|i| format!("err line {i}")).collect();
    let provider = Arc::new(MockProvider::new([
        (
            "alpha",
            Behaviour::Run {
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                exit_status: Some(0),
                delay: Duration::ZERO,
            },
        ),
        ("beta", Behaviour::ok(&["just one"])),
    ]));
    let sink = MemorySink::new();

    let summary = dispatcher(&provider, &sink)
        .with_channel_capacity(8)
        .run(&hosts(&["alpha", "beta"]), "generate")
        .await
        .unwrap();

    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.results[0].stdout_lines, 500);
    assert_eq!(summary.results[0].stderr_lines, 300);
    assert_eq!(sink.lines_for("alpha", StreamKind::Stdout), stdout);
    assert_eq!(sink.lines_for("alpha", StreamKind::Stderr), stderr);
    assert_eq!(sink.lines_for("beta", StreamKind::Stdout), vec!["just one"]);
    assert_eq!(sink.len(), 801);
}

#[tokio::test]
async fn test_interleaved_streams_never_merge_within_a_line() {
    let provider = Arc::new(MockProvider::new([(
        "h1",
        Behaviour::lines(
            &["stdout-aaaa", "stdout-bbbb", "stdout-cccc"],
            &["stderr-1111", "stderr-2222", "stderr-3333"],
            0,
        ),
    )]));
    let sink = MemorySink::new();

    dispatcher(&provider, &sink)
        .run(&hosts(&["h1"]), "noisy")
        .await
        .unwrap();

    for line in sink.lines() {
        match line.stream {
            StreamKind::Stdout => assert!(
                line.text.starts_with("stdout-") && !line.text.contains("stderr"),
                "{line:?}"
            ),
            StreamKind::Stderr => assert!(
                line.text.starts_with("stderr-") && !line.text.contains("stdout"),
                "{line:?}"
            ),
        }
    }
    assert_eq!(
        sink.lines_for("h1", StreamKind::Stdout),
        vec!["stdout-aaaa", "stdout-bbbb", "stdout-cccc"]
    );
    assert_eq!(
        sink.lines_for("h1", StreamKind::Stderr),
        vec!["stderr-1111", "stderr-2222", "stderr-3333"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_host_ends_via_connect_timeout() {
    let provider = Arc::new(MockProvider::new([
        ("stuck", Behaviour::HangConnect),
        ("fine", Behaviour::ok(&["hello"])),
    ]));
    let sink = MemorySink::new();

    let summary = dispatcher(&provider, &sink)
        .with_connect_timeout(Duration::from_secs(5))
        .run(&hosts(&["stuck", "fine"]), "hostname")
        .await
        .unwrap();

    assert!(matches!(
        &summary.results[0].outcome,
        HostOutcome::ConnectFailed(reason) if reason.contains("timed out")
    ));
    assert!(summary.results[1].is_success());
    assert_eq!(sink.lines_for("fine", StreamKind::Stdout), vec!["hello"]);
    assert!(sink.lines_for("stuck", StreamKind::Stdout).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_command_timeout_releases_everything() {
    let provider = Arc::new(MockProvider::new([(
        "slow",
        Behaviour::HangRun {
            stdout: vec!["partial".to_string()],
        },
    )]));
    let sink = MemorySink::new();

    let summary = dispatcher(&provider, &sink)
        .with_command_timeout(Some(Duration::from_secs(10)))
        .run(&hosts(&["slow"]), "sleep infinity")
        .await
        .unwrap();

    assert!(matches!(
        &summary.results[0].outcome,
        HostOutcome::SessionFailed(reason) if reason.contains("timed out")
    ));
    assert_eq!(sink.lines_for("slow", StreamKind::Stdout), vec!["partial"]);
    assert_eq!(provider.stats.session_closes("slow"), 1);
    assert_eq!(provider.stats.closes("slow"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_ends_outstanding_hosts() {
    let provider = Arc::new(MockProvider::new([
        (
            "running",
            Behaviour::HangRun {
                stdout: vec!["started".to_string()],
            },
        ),
        ("connecting", Behaviour::HangConnect),
        ("quick", Behaviour::ok(&["done"])),
    ]));
    let sink = MemorySink::new();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let summary = dispatcher(&provider, &sink)
        .with_command_timeout(None)
        .with_connect_timeout(Duration::from_secs(3600))
        .with_cancellation_token(token)
        .run(&hosts(&["running", "connecting", "quick"]), "work")
        .await
        .unwrap();

    assert_eq!(summary.results[0].outcome, HostOutcome::Cancelled);
    assert_eq!(summary.results[1].outcome, HostOutcome::Cancelled);
    assert!(summary.results[2].is_success());
    assert_eq!(summary.exit_code(), 1);

    assert_eq!(sink.lines_for("running", StreamKind::Stdout), vec!["started"]);
    assert_eq!(provider.stats.closes("running"), 1);
    assert_eq!(provider.stats.session_closes("running"), 1);
    assert_eq!(provider.stats.closes("connecting"), 0);
}

#[tokio::test]
async fn test_session_failure_still_closes_connection() {
    let provider = Arc::new(MockProvider::new([(
        "h1",
        Behaviour::SessionFail("channel open refused".into()),
    )]));
    let sink = MemorySink::new();

    let summary = dispatcher(&provider, &sink)
        .run(&hosts(&["h1"]), "true")
        .await
        .unwrap();

    assert!(matches!(
        &summary.results[0].outcome,
        HostOutcome::SessionFailed(reason) if reason.contains("channel open refused")
    ));
    assert!(sink.is_empty());
    assert_eq!(provider.stats.connects("h1"), 1);
    assert_eq!(provider.stats.closes("h1"), 1);
    assert_eq!(provider.stats.session_closes("h1"), 0);
}

#[tokio::test]
async fn test_zero_output_command() {
    let provider = Arc::new(MockProvider::new([("h1", Behaviour::ok(&[]))]));
    let sink = MemorySink::new();

    let summary = dispatcher(&provider, &sink)
        .run(&hosts(&["h1"]), "true")
        .await
        .unwrap();

    assert!(summary.results[0].is_success());
    assert_eq!(summary.results[0].stdout_lines, 0);
    assert_eq!(summary.results[0].stderr_lines, 0);
    assert!(sink.is_empty());
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn test_command_not_found_is_completed_with_status() {
    let provider = Arc::new(MockProvider::new([(
        "h1",
        Behaviour::lines(&[], &["bash: frobnicate: command not found"], 127),
    )]));
    let sink = MemorySink::new();

    let summary = dispatcher(&provider, &sink)
        .run(&hosts(&["h1"]), "frobnicate")
        .await
        .unwrap();

    assert_eq!(
        summary.results[0].outcome,
        HostOutcome::Completed {
            exit_status: Some(127)
        }
    );
    assert_eq!(
        sink.lines_for("h1", StreamKind::Stderr),
        vec!["bash: frobnicate: command not found"]
    );
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_missing_exit_status_counts_as_failure() {
    let provider = Arc::new(MockProvider::new([(
        "h1",
        Behaviour::Run {
            stdout: vec!["killed soon".to_string()],
            stderr: vec![],
            exit_status: None,
            delay: Duration::ZERO,
        },
    )]));
    let sink = MemorySink::new();

    let summary = dispatcher(&provider, &sink)
        .run(&hosts(&["h1"]), "kill -9 $$")
        .await
        .unwrap();

    assert_eq!(
        summary.results[0].outcome,
        HostOutcome::Completed { exit_status: None }
    );
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_same_command_twice_yields_same_output() {
    let provider = Arc::new(MockProvider::new([
        ("a", Behaviour::lines(&["1", "2"], &["warn"], 0)),
        ("b", Behaviour::ok(&["x", "y", "z"])),
        ("c", Behaviour::ConnectFail("no route to host".into())),
    ]));
    let targets = hosts(&["a", "b", "c"]);

    let first = MemorySink::new();
    let summary_one = dispatcher(&provider, &first)
        .run(&targets, "cmd")
        .await
        .unwrap();
    let second = MemorySink::new();
    let summary_two = dispatcher(&provider, &second)
        .run(&targets, "cmd")
        .await
        .unwrap();

    let mut lines_one = first.lines();
    let mut lines_two = second.lines();
    let key = |l: &OutputLine| (l.host.to_string(), l.stream == StreamKind::Stderr, l.text.clone());
    lines_one.sort_by_key(key);
    lines_two.sort_by_key(key);

    assert_eq!(lines_one, lines_two);
    assert_eq!(summary_one, summary_two);
}

#[tokio::test(start_paused = true)]
async fn test_max_parallel_bounds_open_connections() {
    let names = ["n1", "n2", "n3", "n4", "n5", "n6"];
    let provider = Arc::new(MockProvider::new(names.iter().map(|n| {
        (
            *n,
            Behaviour::Run {
                stdout: vec![format!("from {n}")],
                stderr: vec![],
                exit_status: Some(0),
                delay: Duration::from_secs(1),
            },
        )
    })));
    let sink = MemorySink::new();

    let summary = dispatcher(&provider, &sink)
        .with_max_parallel(2)
        .run(&hosts(&names), "work")
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(sink.len(), 6);
    assert!(provider.stats.peak() <= 2, "peak {}", provider.stats.peak());
    for name in names {
        assert_eq!(provider.stats.closes(name), 1);
    }
}

#[tokio::test]
async fn test_rejects_empty_and_duplicate_host_lists() {
    let provider = Arc::new(MockProvider::new([("h1", Behaviour::ok(&[]))]));
    let sink = MemorySink::new();
    let dispatcher = dispatcher(&provider, &sink);

    assert_eq!(
        dispatcher.run(&[], "true").await.unwrap_err(),
        DispatchError::NoHosts
    );
    assert!(matches!(
        dispatcher.run(&hosts(&["h1", "h1"]), "true").await,
        Err(DispatchError::DuplicateHost(host)) if host == "h1"
    ));
    assert_eq!(provider.stats.connects("h1"), 0);
}

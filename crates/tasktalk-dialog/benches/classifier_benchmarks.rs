//! Benchmarks for the rule-based classification tier.
//!
//! The rule tier runs on every message whenever the model tier is disabled,
//! rate-limited or failing, so it has to stay well under a millisecond.
//!
//! ```bash
//! cargo bench -p tasktalk-dialog
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tasktalk_core::{ConversationTurn, FlowType};
use tasktalk_dialog::{
    ActiveFlow, ClassificationInput, ConversationFlow, IntentClassifier, RuleBasedStrategy,
};

const MESSAGES: &[&str] = &[
    "create task write report",
    "HIGH",
    "what's the weather",
    "create it now",
    "tomorrow",
    "update task 3 priority to low",
    "delete task 7",
    "show my tasks",
    "I need to call the bank before friday",
    "tạo công việc đi chợ ngày mai",
];

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).expect("valid date")
}

fn active_creation() -> ActiveFlow {
    ActiveFlow {
        flow: ConversationFlow::TaskCreation,
        flow_type: FlowType::CreateTask,
        waiting_for: Some("priority".to_string()),
        filled_slots: BTreeMap::from([("title".to_string(), "write report".to_string())]),
    }
}

fn history(turns: usize) -> Vec<ConversationTurn> {
    (0..turns)
        .map(|i| {
            if i % 2 == 0 {
                ConversationTurn::user(format!("message number {}", i))
            } else {
                ConversationTurn::assistant(format!("reply number {}", i))
            }
        })
        .collect()
}

/// Synchronous rule analysis, no runtime involved.
fn bench_rule_analyze(c: &mut Criterion) {
    let strategy = RuleBasedStrategy::new().with_today(today());
    let idle: Vec<_> = MESSAGES
        .iter()
        .map(|m| ClassificationInput::new(*m).with_history(history(20)))
        .collect();
    let in_flow: Vec<_> = MESSAGES
        .iter()
        .map(|m| {
            ClassificationInput::new(*m)
                .with_history(history(20))
                .with_active_flow(Some(active_creation()))
        })
        .collect();

    let mut group = c.benchmark_group("rule_tier");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("idle_10_messages", |b| {
        b.iter(|| {
            for input in &idle {
                black_box(strategy.analyze(input));
            }
        });
    });

    group.bench_function("active_flow_10_messages", |b| {
        b.iter(|| {
            for input in &in_flow {
                black_box(strategy.analyze(input));
            }
        });
    });

    group.finish();
}

/// Full classifier path (strategy selection, anti-drift, mapping).
fn bench_classifier(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");
    let classifier = IntentClassifier::rule_based();
    let input = ClassificationInput::new("what's the weather")
        .with_history(history(20))
        .with_active_flow(Some(active_creation()));

    c.bench_function("classifier_offtopic_in_flow", |b| {
        b.iter(|| {
            let (analysis, result) = rt.block_on(classifier.classify(&input));
            assert!(analysis.should_continue_flow);
            black_box(result)
        });
    });
}

criterion_group!(benches, bench_rule_analyze, bench_classifier);
criterion_main!(benches);

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use hftmon_engine::advisor::{Advisor, AnalysisContext, ChatRole, Risk, ThresholdChat};
use hftmon_engine::artifacts::{default_selection, write_artifacts};
use hftmon_engine::collector::SystemCollector;
use hftmon_engine::interface::FixedProbe;
use hftmon_engine::sampler::Sampler;
use hftmon_engine::sections::{MetricDefinition, SectionsCatalog};
use tempfile::TempDir;

use crate::mocks::{ScriptedBackend, ScriptedRunner};
use crate::test_setup;
use crate::utils::{at, catalog, latency_rows};

const REPLY: &str = r###"Sure, here is my review.
```json
{
  "analysis": "## Findings\nLoad is fine, the governor is already set.",
  "recommendations": [
    {"id": "r1", "title": "Disable irqbalance", "description": "Pin IRQs by hand", "impact": "Lower jitter",
     "commands": ["systemctl stop irqbalance"], "risk": "low", "why_hft": "IRQ migration adds tail latency"},
    {"id": "r2", "title": "Isolate cores", "description": "Add isolcpus", "impact": "Fewer context switches",
     "commands": "grubby --update-kernel=ALL --args=isolcpus=2-7\nreboot", "risk": "HIGH"}
  ]
}
```"###;

fn host() -> Arc<ScriptedRunner> {
    Arc::new(
        ScriptedRunner::new()
            .stdout("lscpu", "Model name: Xeon Gold\n")
            .stdout("cat /proc/loadavg", "0.5\n")
            .stdout("vmstat 1 2", "12000\n")
            .stdout("cat scaling_governor", "performance\n"),
    )
}

/// Collect the profile, sample its dynamic metrics and build the context
async fn latency_context(catalog: &SectionsCatalog, runner: &Arc<ScriptedRunner>) -> AnalysisContext {
    let probe = Arc::new(FixedProbe::new(["eth0"]));
    let entries = catalog.filter_profile("Latency");

    let report = SystemCollector::new(runner.executor(), probe.clone())
        .collect_entries(&entries)
        .await;

    let dynamic: Vec<&MetricDefinition> = entries.iter().copied().filter(|e| e.is_dynamic()).collect();
    let snapshot = Sampler::new(runner.executor(), probe).sample(&dynamic).await;

    AnalysisContext::new("Latency", catalog, Some(&report), &snapshot, "eth0")
}

#[tokio::test]
async fn test_analysis_to_tuning_script() -> Result<()> {
    test_setup!("analysis_flow");
    let catalog = catalog(&latency_rows())?;
    let runner = host();
    let backend = ScriptedBackend::new().reply(REPLY).into_arc();

    let context = latency_context(&catalog, &runner).await;
    assert_eq!(context.snapshot.len(), 3);

    let result = Advisor::new(backend.clone()).analyze(context).await;
    assert!(result.error.is_none());
    assert!(result.analysis.starts_with("## Findings"));
    assert_eq!(result.recommendations.len(), 2);

    let isolate = result.recommendation("r2").context("r2")?;
    assert_eq!(isolate.risk, Risk::High);
    assert_eq!(isolate.commands, ["grubby --update-kernel=ALL --args=isolcpus=2-7", "reboot"]);
    assert!(isolate.why_hft.is_empty());

    // The model saw the collected outputs and the sampled values
    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0][0].role, ChatRole::System);
    let prompt = &requests[0][1].content;
    assert!(prompt.contains("Profile: Latency"));
    assert!(prompt.contains("=== CPU ==="));
    assert!(prompt.contains("--- Model ---\nlscpu\nModel name: Xeon Gold"));
    assert!(prompt.contains("- Load: 0.5"));
    assert!(prompt.contains("- Governor: performance"));
    assert!(!prompt.contains("RX Drops"));

    let selected = default_selection(&result.recommendations);
    assert_eq!(selected.len(), 1);

    let dir = TempDir::new()?;
    let written = write_artifacts(dir.path(), &result.profile, &result.analysis, &selected, at(4, 8, 30, 0))?;

    let script = fs::read_to_string(&written.script)?;
    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("Generated 2024-05-04 08:30"));
    assert!(script.contains("=== Disable irqbalance ==="));
    assert!(script.contains("    systemctl stop irqbalance\n"));
    assert!(!script.contains("isolcpus"));

    let report = fs::read_to_string(&written.report)?;
    assert!(report.starts_with("# Performance Report — Latency\n\n## Findings"));
    Ok(())
}

#[tokio::test]
async fn test_plain_text_reply_has_no_recommendations() -> Result<()> {
    test_setup!("plain_reply");
    let catalog = catalog(&latency_rows())?;
    let runner = host();
    let backend = ScriptedBackend::new()
        .reply("Everything looks tuned already {mostly}.")
        .into_arc();

    let context = latency_context(&catalog, &runner).await;
    let result = Advisor::new(backend).analyze(context).await;

    assert_eq!(result.analysis, "Everything looks tuned already {mostly}.");
    assert!(result.recommendations.is_empty());
    assert!(result.error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_model_degrades_to_text() -> Result<()> {
    test_setup!("unreachable_model");
    let catalog = catalog(&latency_rows())?;
    let backend = ScriptedBackend::new().unreachable().into_arc();

    let context = AnalysisContext::new("Latency", &catalog, None, &Default::default(), "eth0");
    assert!(context.profile_dump.contains("(no output yet)"));

    let result = Advisor::new(backend).analyze(context).await;
    assert!(result.error.is_some());
    assert!(result.recommendations.is_empty());
    assert!(result.analysis.contains("ollama serve"));
    Ok(())
}

#[tokio::test]
async fn test_threshold_chat_keeps_history() -> Result<()> {
    test_setup!("threshold_chat");
    let catalog = catalog(&latency_rows())?;
    let backend = ScriptedBackend::new()
        .reply("Keep Load under 2 on isolated hosts.")
        .unreachable()
        .into_arc();

    let monitored = vec!["Load".to_string(), "RX Drops".to_string()];
    let mut chat = ThresholdChat::new(backend.clone(), &catalog, &monitored);
    assert!(chat
        .system_prompt()
        .contains("- **Load**: unit = load, current min = 0.0000, current max = 4.0000"));
    assert!(chat
        .system_prompt()
        .contains("- **RX Drops**: unit = pkts, current min = not set, current max = 0.0000"));

    let first = chat.send("What should Load be?").await.content.clone();
    assert_eq!(first, "Keep Load under 2 on isolated hosts.");

    let second = chat.send("And drops?").await.content.clone();
    assert!(second.contains("Ollama connection error"));

    // Welcome plus two exchanges; the second request carried the whole conversation
    assert_eq!(chat.messages().len(), 5);
    let requests = backend.requests();
    assert_eq!(requests[1].len(), 5);
    assert_eq!(requests[1][0].role, ChatRole::System);

    chat.clear();
    assert_eq!(chat.messages().len(), 1);
    assert_eq!(chat.messages()[0].role, ChatRole::Assistant);
    Ok(())
}

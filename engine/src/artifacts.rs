//! Tuning script and report generation

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::info;

use crate::advisor::{Recommendation, Risk};
use crate::error::ArtifactError;

pub const SCRIPT_FILE_NAME: &str = "tune_system.sh";
pub const REPORT_FILE_NAME: &str = "performance_report.md";

/// Recommendations selected unless the user says otherwise: everything but high risk
pub fn default_selection(recommendations: &[Recommendation]) -> Vec<&Recommendation> {
    recommendations.iter().filter(|r| r.risk != Risk::High).collect()
}

/// Recommendations whose id is listed, in reply order
pub fn select_by_ids<'a, S: AsRef<str>>(recommendations: &'a [Recommendation], ids: &[S]) -> Vec<&'a Recommendation> {
    recommendations
        .iter()
        .filter(|r| ids.iter().any(|id| id.as_ref() == r.id))
        .collect()
}

/// Quote text for use inside a double-quoted bash string
/// Text placed after `#` must stay on the comment line
fn comment_text(text: &str) -> String {
    text.chars().map(|ch| if ch.is_control() { ' ' } else { ch }).collect()
}

fn escape_double_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '"' | '\\' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Interactive bash script that asks before applying each recommendation
pub fn render_tuning_script(
    profile: &str,
    selected: &[&Recommendation],
    generated_at: NaiveDateTime,
) -> Result<String, ArtifactError> {
    if selected.is_empty() {
        return Err(ArtifactError::NothingSelected);
    }

    let mut lines = vec![
        "#!/bin/bash".to_string(),
        format!(
            "# HFT Tuning Script — {} — Generated {}",
            comment_text(profile),
            generated_at.format("%Y-%m-%d %H:%M")
        ),
        r#"echo -e "\033[1;36m=== HFT Performance Tuning ===\033[0m""#.to_string(),
    ];

    for recommendation in selected {
        lines.push(format!(
            r#"echo -e "\033[1;33m=== {} ===\033[0m""#,
            escape_double_quoted(&recommendation.title)
        ));
        lines.push(format!(r#"echo "{}""#, escape_double_quoted(&recommendation.description)));
        lines.push(r#"read -p "Apply this recommendation? (y/N): " ans"#.to_string());
        lines.push("if [[ $ans =~ ^[Yy]$ ]]; then".to_string());
        for command in &recommendation.commands {
            lines.push(format!("    {}", command));
        }
        lines.push(r#"    echo -e "\033[32m✅ Applied\033[0m""#.to_string());
        lines.push("else".to_string());
        lines.push(r#"    echo -e "\033[33m⏭️ Skipped\033[0m""#.to_string());
        lines.push("fi".to_string());
    }

    let mut script = lines.join("\n");
    script.push('\n');
    Ok(script)
}

/// Markdown report echoing the analysis
pub fn render_report(profile: &str, analysis: &str) -> String {
    let analysis = if analysis.trim().is_empty() {
        "No analysis generated"
    } else {
        analysis
    };
    format!("# Performance Report — {}\n\n{}", profile, analysis)
}

/// Paths of written artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningArtifacts {
    pub script: PathBuf,
    pub report: PathBuf,
}

fn write_file(path: &Path, content: &str) -> Result<(), ArtifactError> {
    fs::write(path, content).map_err(|source| ArtifactError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Write `tune_system.sh` and `performance_report.md` into `dir`
pub fn write_artifacts<P: AsRef<Path>>(
    dir: P,
    profile: &str,
    analysis: &str,
    selected: &[&Recommendation],
    generated_at: NaiveDateTime,
) -> Result<TuningArtifacts, ArtifactError> {
    let dir = dir.as_ref();
    let script = render_tuning_script(profile, selected, generated_at)?;
    let report = render_report(profile, analysis);

    fs::create_dir_all(dir).map_err(|source| ArtifactError::Write {
        path: dir.display().to_string(),
        source,
    })?;

    let script_path = dir.join(SCRIPT_FILE_NAME);
    let report_path = dir.join(REPORT_FILE_NAME);
    write_file(&script_path, &script)?;
    write_file(&report_path, &report)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755)).map_err(|source| {
            ArtifactError::Write {
                path: script_path.display().to_string(),
                source,
            }
        })?;
    }

    info!(
        script = %script_path.display(),
        report = %report_path.display(),
        recommendations = selected.len(),
        "Wrote tuning artifacts"
    );

    Ok(TuningArtifacts {
        script: script_path,
        report: report_path,
    })
}

use anyhow::{Context, Result, bail};
use conversion_router::{ConversionOptions, ConversionRouter, EngineState};
use docswap::{
    ConversionJobManager, ConversionSubmission, JobSnapshot, JobStatus, router_task,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::output;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const ERR_JOB_LOST: &str = "Job is no longer tracked by the manager";

/// One file handed to the job manager.
struct Planned {
    input: PathBuf,
    output: PathBuf,
    input_format: String,
}

pub struct CommandExecutor {
    config: AppConfig,
    router: Arc<ConversionRouter>,
}

impl CommandExecutor {
    pub fn new(config: AppConfig) -> Self {
        let router = Arc::new(config.build_router());
        Self { config, router }
    }

    pub async fn convert(
        &self,
        inputs: &[PathBuf],
        to: &str,
        from: Option<&str>,
        output: Option<&Path>,
        raw_options: &[String],
        json: bool,
    ) -> Result<()> {
        let options = parse_options(raw_options)?;
        let planned = inputs
            .iter()
            .map(|input| self.plan(input, to, from, output, inputs.len() > 1))
            .collect::<Result<Vec<_>>>()?;

        let manager = Arc::new(ConversionJobManager::new(self.config.manager.clone())?);
        let session_id = format!("cli-{}", std::process::id());
        let progress = if json {
            MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let style = ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos:>3}% {prefix} {msg}")?
            .progress_chars("=> ");

        let mut jobs = Vec::with_capacity(planned.len());
        for plan in &planned {
            let file_id = plan
                .input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let submission = ConversionSubmission::new(
                &session_id,
                file_id.clone(),
                &plan.input,
                &plan.output,
                &plan.input_format,
                to,
            )
            .with_options(options.clone());
            let job_id = manager.submit_conversion(submission, router_task(self.router.clone()))?;
            let snapshot = manager
                .get_job_status(&job_id)
                .with_context(|| format!("Job {job_id} disappeared right after submission"))?;

            let bar = progress.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            bar.set_prefix(file_id);
            bar.enable_steady_tick(Duration::from_millis(120));
            jobs.push(TrackedJob { snapshot, bar });
        }

        let interrupt = {
            let manager = manager.clone();
            let job_ids: Vec<String> = jobs.iter().map(|job| job.snapshot.job_id.clone()).collect();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling {} jobs", job_ids.len());
                    for job_id in &job_ids {
                        manager.cancel_job(job_id);
                    }
                }
            })
        };

        let results = wait_for_jobs(|job_id| manager.get_job_status(job_id), jobs).await;
        interrupt.abort();
        manager.shutdown().await;

        let failed = results
            .iter()
            .filter(|job| job.status != JobStatus::Completed)
            .count();

        if json {
            println!("{}", serde_json::to_string_pretty(&results)?);
        } else {
            print_results(&results);
        }

        if failed > 0 {
            bail!("{} of {} conversions did not complete", failed, results.len());
        }
        Ok(())
    }

    fn plan(
        &self,
        input: &Path,
        to: &str,
        from: Option<&str>,
        output: Option<&Path>,
        many: bool,
    ) -> Result<Planned> {
        let input_format = match from {
            Some(format) => format.to_string(),
            None => self
                .router
                .detect_format(input)
                .map(str::to_string)
                .with_context(|| {
                    format!(
                        "Cannot detect the format of {}, pass --from",
                        input.display()
                    )
                })?,
        };

        if !self.router.can_convert(&input_format, to) {
            let supported = self.router.format_info(&input_format).can_convert_to;
            bail!(
                "Conversion from {} to {} not supported (available: {})",
                input_format,
                to,
                output::list(&supported)
            );
        }

        let output = match output {
            Some(dir) if many => dir.join(output_name(input, to)),
            Some(file) => file.to_path_buf(),
            None => input.with_extension(to),
        };
        debug!("Planned {} -> {}", input.display(), output.display());

        Ok(Planned {
            input: input.to_path_buf(),
            output,
            input_format,
        })
    }

    pub fn formats(&self, json: bool) -> Result<()> {
        let supported = self.router.get_supported_formats();
        let matrix = self.router.get_conversion_matrix();

        if json {
            let body = serde_json::json!({
                "input_formats": supported.inputs,
                "output_formats": supported.outputs,
                "conversion_matrix": matrix,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            return Ok(());
        }

        println!("{}", output::heading("Supported formats"));
        println!("  {} {}", output::label("Inputs: "), output::list(&supported.inputs));
        println!("  {} {}", output::label("Outputs:"), output::list(&supported.outputs));
        println!();
        println!("{}", output::heading("Conversion matrix"));
        for (input, outputs) in &matrix {
            println!("  {:<6} -> {}", output::value(input), output::list(outputs));
        }
        Ok(())
    }

    pub fn engines(&self, json: bool) -> Result<()> {
        let statuses = self.router.get_engine_status();

        if json {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
            return Ok(());
        }

        for status in &statuses {
            let state = match status.status {
                EngineState::Active => output::success("active"),
                EngineState::Unavailable => output::failure("unavailable"),
            };
            println!("{} ({})", output::heading(&status.name), state);
            if let Some(version) = &status.version {
                println!("  {} {}", output::label("Version:"), output::muted(version));
            }
            println!(
                "  {} {}",
                output::label("Inputs: "),
                output::list(&status.supported_inputs)
            );
            println!(
                "  {} {}",
                output::label("Outputs:"),
                output::list(&status.supported_outputs)
            );
            let features: Vec<String> = status
                .features
                .iter()
                .filter(|(_, enabled)| **enabled)
                .map(|(name, _)| name.clone())
                .collect();
            println!("  {} {}", output::label("Features:"), output::list(&features));
        }
        Ok(())
    }

    pub fn info(&self, format: &str, to: Option<&str>, json: bool) -> Result<()> {
        if let Some(to) = to {
            let options = self.router.get_conversion_options(format, to);
            if json {
                println!("{}", serde_json::to_string_pretty(&options)?);
                return Ok(());
            }

            let verdict = if options.supported {
                output::success("supported")
            } else {
                output::failure("not supported")
            };
            println!(
                "{} -> {}: {}",
                output::value(&options.input_format),
                output::value(&options.output_format),
                verdict
            );
            println!("  {} {}", output::label("Engines:"), output::list(&options.engines));
            for (name, descriptor) in &options.options {
                println!(
                    "  {} {} {}",
                    output::value(name),
                    output::muted(&format!("({:?})", descriptor.kind).to_lowercase()),
                    descriptor.description
                );
            }
            return Ok(());
        }

        let info = self.router.format_info(format);
        if json {
            println!("{}", serde_json::to_string_pretty(&info)?);
            return Ok(());
        }

        println!("{} ({})", output::heading(&info.name), info.format);
        println!("  {} {}", output::label("Description:"), info.description);
        println!("  {} {:?}", output::label("Category:   "), info.category);
        println!("  {} {}", output::label("Extensions: "), output::list(&info.extensions));
        println!("  {} {}", output::label("Converts to:"), output::list(&info.can_convert_to));
        println!(
            "  {} {}",
            output::label("Converts from:"),
            output::list(&info.can_convert_from)
        );
        Ok(())
    }
}

/// A submitted job with the last state seen for it.
struct TrackedJob {
    snapshot: JobSnapshot,
    bar: ProgressBar,
}

/// Poll until every job is terminal. A job that stops being tracked counts as
/// failed, from its last seen state.
async fn wait_for_jobs<F>(lookup: F, jobs: Vec<TrackedJob>) -> Vec<JobSnapshot>
where
    F: Fn(&str) -> Option<JobSnapshot>,
{
    let mut pending = jobs;
    let mut finished: Vec<Option<JobSnapshot>> = vec![None; pending.len()];

    while finished.iter().any(Option::is_none) {
        for (slot, tracked) in finished.iter_mut().zip(pending.iter_mut()) {
            if slot.is_some() {
                continue;
            }

            let job = match lookup(&tracked.snapshot.job_id) {
                Some(job) => job,
                None => {
                    warn!(job_id = %tracked.snapshot.job_id, "Job is no longer tracked");
                    let mut job = tracked.snapshot.clone();
                    job.status = JobStatus::Failed;
                    job.error = Some(ERR_JOB_LOST.to_string());
                    job
                }
            };

            tracked.bar.set_position(u64::from(job.progress));
            tracked.bar.set_message(job.message.clone());
            if job.is_terminal() {
                match job.status {
                    JobStatus::Completed => tracked.bar.finish_with_message(output::success("done")),
                    _ => tracked
                        .bar
                        .abandon_with_message(output::failure(job.status.as_str())),
                }
                info!(job_id = %job.job_id, status = %job.status, "Job finished");
                *slot = Some(job);
            } else {
                tracked.snapshot = job;
            }
        }
        if finished.iter().any(Option::is_none) {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    finished.into_iter().flatten().collect()
}

fn print_results(results: &[JobSnapshot]) {
    println!();
    for job in results {
        let duration = job
            .duration_secs()
            .map(|secs| format!(" in {secs:.2}s"))
            .unwrap_or_default();
        match job.status {
            JobStatus::Completed => println!(
                "{} {} -> {}{}{}",
                output::success("✓"),
                job.input_path.display(),
                output::value(&job.output_path.display().to_string()),
                duration,
                job.engine
                    .as_deref()
                    .map(|engine| output::muted(&format!(" ({engine})")))
                    .unwrap_or_default()
            ),
            _ => println!(
                "{} {}: {}",
                output::failure("✗"),
                job.input_path.display(),
                job.error.as_deref().unwrap_or(job.message.as_str())
            ),
        }
    }
}

/// `out.html` for `dir/in.txt` converted to html.
fn output_name(input: &Path, to: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    PathBuf::from(format!("{stem}.{to}"))
}

/// Parse `key=value` pairs; values are JSON when they parse as JSON.
fn parse_options(raw: &[String]) -> Result<ConversionOptions> {
    let mut options = ConversionOptions::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid option '{pair}', expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid option '{pair}', key is empty");
        }
        let value = serde_json::from_str(value.trim())
            .unwrap_or_else(|_| Value::String(value.to_string()));
        options.insert(key.to_string(), value);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_options() {
        let options = parse_options(&[
            "quality=80".to_string(),
            "title=Quarterly report".to_string(),
            "preserve_formatting=false".to_string(),
        ])
        .unwrap();
        assert_eq!(options["quality"], 80);
        assert_eq!(options["title"], "Quarterly report");
        assert_eq!(options["preserve_formatting"], false);

        assert!(parse_options(&["novalue".to_string()]).is_err());
        assert!(parse_options(&["=1".to_string()]).is_err());
    }

    #[test]
    fn test_output_name() {
        assert_eq!(
            output_name(Path::new("/docs/report.txt"), "html"),
            PathBuf::from("report.html")
        );
    }

    #[test]
    fn test_plan_detects_format_and_rejects_unsupported() {
        let executor = CommandExecutor::new(AppConfig::default());

        let plan = executor
            .plan(Path::new("notes.txt"), "html", None, None, false)
            .unwrap();
        assert_eq!(plan.input_format, "txt");
        assert_eq!(plan.output, PathBuf::from("notes.html"));

        let plan = executor
            .plan(Path::new("a.csv"), "html", None, Some(Path::new("out")), true)
            .unwrap();
        assert_eq!(plan.output, PathBuf::from("out/a.html"));

        assert!(executor.plan(Path::new("scan.pdf"), "png", None, None, false).is_err());
        assert!(executor.plan(Path::new("blob.xyz"), "txt", None, None, false).is_err());
    }

    #[tokio::test]
    async fn test_convert_text_file() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("notes.txt");
        std::fs::write(&input, "hello <world>").unwrap();

        let executor = CommandExecutor::new(AppConfig::default());
        executor
            .convert(&[input.clone()], "html", None, None, &[], true)
            .await
            .unwrap();

        let html = std::fs::read_to_string(temp_dir.path().join("notes.html")).unwrap();
        assert!(html.contains("hello &lt;world&gt;"));
    }

    #[tokio::test]
    async fn test_untracked_job_counts_as_failed() {
        let job = JobSnapshot::new(
            ConversionSubmission::new("s", "f", "/in.txt", "/out.html", "txt", "html"),
            300,
        );
        let tracked = TrackedJob {
            snapshot: job.clone(),
            bar: ProgressBar::hidden(),
        };

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_jobs(|_| None, vec![tracked]),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].job_id, job.job_id);
        assert_eq!(results[0].status, JobStatus::Failed);
        assert_eq!(results[0].error.as_deref(), Some(ERR_JOB_LOST));
    }
}

//! The `lorakit tag` command: tag one dataset in-process.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use console::style;
use lorakit_core::types::{parse_tag_list, parse_tag_replacement};
use lorakit_core::{
    Config, JobManager, JobOutcome, Orchestrator, RatingMode, TaggingJobConfig,
};

/// Where the rating tag goes.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RatingArg {
    None,
    First,
    Last,
}

impl From<RatingArg> for RatingMode {
    fn from(arg: RatingArg) -> Self {
        match arg {
            RatingArg::None => RatingMode::None,
            RatingArg::First => RatingMode::First,
            RatingArg::Last => RatingMode::Last,
        }
    }
}

#[derive(Args, Debug)]
pub struct TagArgs {
    /// Dataset directory
    pub dir: PathBuf,

    /// Tagger model identifier (vendor/name)
    #[arg(long)]
    pub model: Option<String>,

    /// Overall confidence threshold
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Threshold for general tags
    #[arg(long)]
    pub general_threshold: Option<f32>,

    /// Threshold for character tags
    #[arg(long)]
    pub character_threshold: Option<f32>,

    /// Caption file extension
    #[arg(long)]
    pub caption_extension: Option<String>,

    /// Separator between tags in caption files
    #[arg(long)]
    pub caption_separator: Option<String>,

    /// Comma-separated tags to drop
    #[arg(long, default_value = "")]
    pub undesired_tags: String,

    /// Replacements as `source,target;source2,target2`
    #[arg(long, default_value = "")]
    pub tag_replacement: String,

    /// Comma-separated tags to put first
    #[arg(long, default_value = "")]
    pub always_first_tags: String,

    /// Put character tags before general tags
    #[arg(long)]
    pub character_tags_first: bool,

    /// Rating tag position
    #[arg(long, value_enum, default_value = "none")]
    pub rating: RatingArg,

    /// Replace underscores with spaces
    #[arg(long)]
    pub remove_underscore: bool,

    /// Split `name_(series)` character tags in two
    #[arg(long)]
    pub character_tag_expand: bool,

    /// Merge with existing captions instead of overwriting
    #[arg(long)]
    pub append: bool,

    /// Include subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Images per inference call
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Concurrent preprocessing workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log every image's tags and confidences
    #[arg(long)]
    pub debug: bool,
}

impl TagArgs {
    /// Job config: app defaults, then flags.
    pub fn to_job_config(&self, config: &Config) -> anyhow::Result<TaggingJobConfig> {
        let mut job = TaggingJobConfig::from_defaults(&config.tagging);
        job.dataset_dir = self.dir.clone();
        if let Some(model) = &self.model {
            job.model = model.clone();
        }
        if let Some(threshold) = self.threshold {
            job.threshold = threshold;
        }
        job.general_threshold = self.general_threshold;
        job.character_threshold = self.character_threshold;
        if let Some(ext) = &self.caption_extension {
            job.caption_extension = ext.clone();
        }
        if let Some(sep) = &self.caption_separator {
            job.caption_separator = sep.clone();
        }
        job.undesired_tags = parse_tag_list(&self.undesired_tags);
        job.tag_replacement = parse_tag_replacement(&self.tag_replacement)?;
        job.always_first_tags = parse_tag_list(&self.always_first_tags);
        job.character_tags_first = self.character_tags_first;
        job.rating_mode = self.rating.into();
        job.remove_underscore = self.remove_underscore;
        job.character_tag_expand = self.character_tag_expand;
        job.append_tags = self.append;
        job.recursive = self.recursive;
        if let Some(batch_size) = self.batch_size {
            job.batch_size = batch_size;
        }
        if let Some(workers) = self.workers {
            job.worker_count = workers;
        }
        job.debug = self.debug;
        Ok(job)
    }
}

pub async fn execute(args: TagArgs, config: Config) -> anyhow::Result<()> {
    if !args.dir.is_dir() {
        anyhow::bail!("Dataset directory not found: {}", args.dir.display());
    }
    let job_config = args.to_job_config(&config)?;

    let manager = JobManager::new(Orchestrator::from_config(&config));
    let job_id = manager.start(job_config).await?;
    let job = manager.get(&job_id).await?;
    let start = Instant::now();

    let progress = create_progress_bar();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                progress.set_message("stopping after current image...");
                job.stop();
            }
        }

        let report = job.report();
        progress.set_length(report.total_images as u64);
        progress.set_position(report.processed as u64);
        if let Some(current) = &report.current_image {
            if !interrupted {
                progress.set_message(current.clone());
            }
        }
        if report.status.is_terminal() {
            break;
        }
    }

    let outcome = job.wait().await;
    progress.finish_and_clear();
    print_summary(&outcome, start.elapsed());

    if let Some(error) = &outcome.error {
        anyhow::bail!("Tagging failed: {error}");
    }
    Ok(())
}

fn create_progress_bar() -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
    {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message("loading model...");
    pb
}

const TOP_TAGS: usize = 15;

fn print_summary(outcome: &JobOutcome, elapsed: Duration) {
    let status = if outcome.success {
        style(outcome.status.to_string()).green()
    } else {
        style(outcome.status.to_string()).red()
    };
    let rate = if elapsed.as_secs_f64() > 0.0 {
        outcome.total_images as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("             Tagging {}", status);
    eprintln!("  ====================================");
    eprintln!("    Images:       {:>8}", outcome.total_images);
    eprintln!("    Captions:     {:>8}", outcome.captions_written);
    if !outcome.errors.is_empty() {
        eprintln!("    Errors:       {:>8}", outcome.errors.len());
    }
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("  ====================================");

    if !outcome.errors.is_empty() {
        eprintln!();
        for error in &outcome.errors {
            eprintln!("  {} {} ({}): {}", style("✗").red(), error.file, error.stage, error.message);
        }
    }

    let top = outcome.top_tags(TOP_TAGS);
    if !top.is_empty() {
        eprintln!();
        eprintln!("  Top tags:");
        for (tag, count) in top {
            eprintln!("    {:>6}  {}", count, tag);
        }
    }
}

use clap::{Args, Parser, Subcommand, ValueEnum};
use pulse_core::{GenerateRequest, ReasoningEffort, ReasoningSummary};

/// Command line for the `pulse` binary.
#[derive(Parser, Debug)]
#[command(author, version, about = "Stream AI-written posts from the TechPulse backend", long_about = None, name = "pulse")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Backend base URL, e.g. http://localhost:8000/api
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Seconds without data before a stream is abandoned
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate content for a topic
    Generate {
        /// Topic or instructions for the post
        topic: String,
        #[command(flatten)]
        options: GenerateOptions,
    },
    /// Revise the content of an earlier thread
    Refine {
        /// Thread id printed at the end of a previous run
        #[arg(long)]
        thread_id: String,
        /// What to change
        feedback: String,
        #[command(flatten)]
        options: GenerateOptions,
    },
    /// Manage conversation history
    Conversations {
        #[command(subcommand)]
        action: ConversationsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConversationsAction {
    /// List stored conversations
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Delete a conversation by id
    Delete { id: String },
}

#[derive(Args, Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Target platform, repeatable (defaults from config)
    #[arg(short, long = "platform")]
    pub platforms: Vec<String>,

    #[arg(long)]
    pub content_type: Option<String>,

    #[arg(long)]
    pub language: Option<String>,

    #[arg(long, value_enum)]
    pub effort: Option<EffortArg>,

    #[arg(long, value_enum)]
    pub summary: Option<SummaryArg>,

    /// Ask for two variants for A/B comparison
    #[arg(long)]
    pub ab: bool,

    /// Print the reasoning transcript after the content
    #[arg(long)]
    pub show_reasoning: bool,

    /// Print the final session view as JSON instead of streaming
    #[arg(long)]
    pub json: bool,
}

impl GenerateOptions {
    /// Overlay the flags that were given on top of `request`.
    pub fn apply(&self, mut request: GenerateRequest) -> GenerateRequest {
        if !self.platforms.is_empty() {
            request = request.with_platforms(self.platforms.iter().cloned());
        }
        if let Some(content_type) = &self.content_type {
            request = request.with_content_type(content_type.clone());
        }
        if let Some(language) = &self.language {
            request = request.with_language(language.clone());
        }
        let effort = self.effort.map(Into::into).unwrap_or(request.reasoning_effort);
        let summary = self.summary.map(Into::into).unwrap_or(request.reasoning_summary);
        let ab_mode = self.ab || request.ab_mode;
        request
            .with_reasoning(effort, summary)
            .with_ab_mode(ab_mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EffortArg {
    Off,
    Low,
    Medium,
    High,
}

impl From<EffortArg> for ReasoningEffort {
    fn from(arg: EffortArg) -> Self {
        match arg {
            EffortArg::Off => ReasoningEffort::Off,
            EffortArg::Low => ReasoningEffort::Low,
            EffortArg::Medium => ReasoningEffort::Medium,
            EffortArg::High => ReasoningEffort::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryArg {
    Off,
    Auto,
    Concise,
    Detailed,
}

impl From<SummaryArg> for ReasoningSummary {
    fn from(arg: SummaryArg) -> Self {
        match arg {
            SummaryArg::Off => ReasoningSummary::Off,
            SummaryArg::Auto => ReasoningSummary::Auto,
            SummaryArg::Concise => ReasoningSummary::Concise,
            SummaryArg::Detailed => ReasoningSummary::Detailed,
        }
    }
}

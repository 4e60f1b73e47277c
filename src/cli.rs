use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "agent-tasks", version, about = "One-shot LLM task runners")]
pub struct Cli {
    #[command(subcommand)]
    pub task: Task,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Split the poligon data file into lines and submit them
    Poligon,
    /// Answer the login page question and sign in
    Login,
    /// Pass the robot verification dialog
    Verify,
    /// Repair the calibration file
    Json,
    /// Anonymize the agent report with the local model
    Censorship,
    /// Find the street from interrogation recordings
    Mp3,
    /// Name the city on the map fragments
    Map,
    /// Generate the robot image from its description
    Robotid,
    /// Sort factory reports into people and hardware
    Kategorie,
    /// Answer questions about the multimedia article
    Arxiv,
    /// Tag factory reports for search
    Dokumenty,
    /// Find the weapons report date through vector search
    Wektory,
    /// Ask the hub database for active datacenters with inactive managers
    Database,
    /// Track Barbara through the people and places lookups
    Loop,
    /// Shortest acquaintance path between Rafał and Barbara
    Connections,
    /// Repair Barbara's photos and describe her
    Photos,
    /// Start a fine-tuning job from the lab samples
    FineTune,
    /// Classify lab samples with the fine-tuned model
    Research,
    /// Crawl the company site and answer its questions
    Softo,
    /// Answer questions about Rafał's notebook
    Notes,
    /// Register the drone endpoint with the hub
    Webhook,
    /// Serve the drone endpoint
    Serve,
}

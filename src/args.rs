use clap::{Parser, Subcommand};

/// Publish open-ended questions, collect free-text answers, and rank what people said.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON configuration file. See the manual of the open_poll
    /// library for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, optional) The JSON file holding polls and responses. Overrides the
    /// store set in the configuration file. Defaults to polls.json.
    #[clap(short, long, value_parser)]
    pub store: Option<String>,

    /// The admin password. Required by all the commands that manage polls.
    #[clap(long, value_parser)]
    pub admin_password: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Publishes a new poll and prints it with its code.
    Create {
        #[clap(value_parser)]
        question: String,
    },
    /// Lists all the polls, newest first, with their response counts.
    List,
    /// Prints a poll with all its responses.
    Show {
        #[clap(value_parser)]
        id: String,
    },
    /// Prints the public view of the poll behind a code.
    Lookup {
        #[clap(value_parser)]
        code: String,
    },
    /// Records a response to the poll behind a code.
    Submit {
        #[clap(value_parser)]
        code: String,
        #[clap(value_parser)]
        text: String,
    },
    /// Closes a poll and computes its word frequencies and summary.
    Close {
        #[clap(value_parser)]
        id: String,
    },
    /// Accepts responses again on a closed poll. The last aggregate is kept.
    Reopen {
        #[clap(value_parser)]
        id: String,
    },
    /// Rewords the question of an active poll.
    Edit {
        #[clap(value_parser)]
        id: String,
        #[clap(value_parser)]
        question: String,
    },
    /// Deletes a poll and all its responses.
    Delete {
        #[clap(value_parser)]
        id: String,
    },
    /// (file path, 'stdout' or empty) Writes the responses and ranked terms of a poll as CSV.
    Export {
        #[clap(value_parser)]
        id: String,
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },
    /// Ranks the terms of a text file (one response per line) without using the store.
    Aggregate {
        #[clap(short, long, value_parser)]
        input: String,
    },
}

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start tabdeck as a service.
    Daemon {},

    /// Resolve a page title and icon for a url and print it.
    Resolve {
        /// a url
        url: String,
    },

    /// Add a bookmark.
    Add {
        /// a url
        url: String,

        /// Bookmark title (resolved from the page when omitted)
        #[clap(short, long)]
        title: Option<String>,

        /// Icon url (resolved from the page when omitted)
        #[clap(short, long)]
        icon: Option<String>,

        /// Group to add the bookmark to
        #[clap(short, long, default_value = crate::board::DEFAULT_GROUP)]
        group: String,

        /// Render the icon on a white tile
        #[clap(long, default_value = "false")]
        white_bg: bool,
    },

    /// Print the whole board.
    List {},

    /// Import a board from a json file.
    ///
    /// Accepts the versioned export payload, a bare bookmark array
    /// or a legacy group-map object.
    Import {
        /// path to the json file
        file: String,
    },

    /// Export the board to a json file.
    Export {
        /// output path (defaults to "bookmarks <date>.json")
        #[clap(short, long)]
        output: Option<String>,
    },

    /// Delete every group and bookmark.
    Clear {
        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },
}

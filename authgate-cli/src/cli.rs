use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(about = "AuthGate - session management for the auth service")]
#[command(version)]
pub struct Cli {
    /// Override the auth service base URL
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Keep session data in memory only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the resolved session state
    Status,

    /// Sign in with email and password
    Login {
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account through the login-flow signup endpoint
    Signup {
        name: String,
        email: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account through the registration endpoint
    Register {
        name: String,
        email: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Print the current user
    Whoami {
        /// Fetch from the service instead of the cache
        #[arg(long)]
        refresh: bool,
    },

    /// End the session and clear stored credentials
    Logout,

    /// Print the Google authorization URL
    OauthUrl,

    /// Finish a Google sign-in after the service set session cookies
    OauthComplete,

    /// Exit 0 if the current user holds ROLE
    HasRole { role: String },

    /// Show or change the interface language
    Locale {
        /// `tr` or `en`
        set: Option<String>,
    },
}

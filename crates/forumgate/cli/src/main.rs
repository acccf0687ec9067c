// Forumgate
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod state;

use crate::commands::CommandContext;
use anyhow::Result;
use forumgate_core::GatewayConfig;
use forumgate_core::GatewayError;
use forumgate_core::logging::init_logging;

/// Administrative CLI for the forum access and notification gateway
#[derive(Parser, Debug)]
#[command(name = "forumgate", about = "Forum access & notification gateway administration")]
pub struct Cli {
    /// Path to configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory location (overrides $FORUMGATE_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands for forumgate
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a forum, optionally below a parent
    AddForum {
        forum_id: String,
        #[arg(long)]
        parent: Option<String>,
    },

    /// Set one category of a forum to custom grants or back to inherited
    SetAccess {
        forum_id: String,
        /// view, members or moderators
        category: String,
        /// custom or inherited
        mode: String,
        /// Comma separated grantees, e.g. `role:editor,user:7`
        grants: Option<String>,
    },

    /// Show stored and effective access of a forum
    ShowAccess { forum_id: String, category: Option<String> },

    /// Check whether a user may perform an action in a forum
    CanAccess {
        user: String,
        forum_id: String,
        /// view, post or moderate
        action: String,
        /// Extra grantees the user holds (repeatable)
        #[arg(long = "grantee")]
        grantees: Vec<String>,
    },

    /// Queue a notification event as `key=value` payload fields
    Enqueue { source: String, recipient: String, fields: Vec<String> },

    /// Deliver every pending digest now
    TriggerDispatch,

    /// Print the cache key of a request context
    CacheKey {
        #[arg(long, default_value = "full")]
        view_mode: String,
        #[arg(long, default_value = "en")]
        langcode: String,
        #[arg(long)]
        location: Option<String>,
    },
}

fn run(cli: Cli) -> Result<()> {
    let config = GatewayConfig::resolve_config(cli.config, cli.data_dir)?;
    init_logging(&config.logging);

    let ctx = CommandContext::new(config)?;

    match cli.command {
        Commands::AddForum { forum_id, parent } => {
            commands::access::add_forum(&ctx, &forum_id, parent.as_deref())?;
        }
        Commands::SetAccess { forum_id, category, mode, grants } => {
            commands::access::set_access(&ctx, &forum_id, &category, &mode, grants.as_deref())?;
        }
        Commands::ShowAccess { forum_id, category } => {
            commands::access::show_access(&ctx, &forum_id, category.as_deref())?;
        }
        Commands::CanAccess { user, forum_id, action, grantees } => {
            commands::access::can_access(&ctx, &user, &forum_id, &action, &grantees)?;
        }
        Commands::Enqueue { source, recipient, fields } => {
            commands::notify::enqueue(&ctx, &source, &recipient, &fields)?;
        }
        Commands::TriggerDispatch => {
            commands::notify::trigger_dispatch(&ctx)?;
        }
        Commands::CacheKey { view_mode, langcode, location } => {
            commands::cache::print_cache_key(&view_mode, &langcode, location.as_deref());
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<GatewayError>() {
            Some(gateway_error) => {
                eprintln!("error[{}]: {}", gateway_error.error_class(), gateway_error);
                ExitCode::from(gateway_error.exit_code() as u8)
            }
            None => {
                eprintln!("error[Error]: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

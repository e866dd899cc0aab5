use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fitwork::api::dto::ConsultRequest;
use fitwork::auth::services;
use fitwork::auth::Decision;
use fitwork::routes::{Access, SCREENS};
use fitwork::state::SessionContext;

/// FitWork client: sign in, check screen access, talk to the career consultant
#[derive(Parser, Debug)]
#[command(name = "fitwork", version, about, long_about = None)]
pub struct Cli {
    /// Backend base URL (overrides FITWORK_API_URL)
    #[arg(long = "api-url")]
    pub api_url: Option<String>,

    /// Where the session tokens are kept (overrides FITWORK_TOKEN_FILE)
    #[arg(long = "token-file")]
    pub token_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FITWORK_PASSWORD", hide_env_values = true)]
        password: String,
        /// Screen to return to after signing in
        #[arg(long = "return-to")]
        return_to: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "FITWORK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Run the access gate for a screen path
    Check { path: String },
    /// Show the signed-in user
    Whoami,
    /// List the screens and who may open them
    Routes,
    /// Ask the career consultant a question
    Consult {
        question: String,
        #[arg(long = "history")]
        history_id: Option<String>,
    },
}

pub async fn run(command: Command, ctx: &SessionContext) -> anyhow::Result<()> {
    match command {
        Command::Login {
            email,
            password,
            return_to,
        } => {
            let landing =
                services::login(ctx, &email, &password, return_to.as_deref()).await?;
            println!("signed in as {}; continue at {}", landing.role, landing.path);
        }
        Command::Register {
            email,
            username,
            password,
        } => {
            services::register(ctx, &email, &username, &password).await?;
            println!("account created; sign in with `fitwork login`");
        }
        Command::Logout => {
            services::logout(ctx).await?;
            println!("signed out");
        }
        Command::Check { path } => {
            if let Some(home) = services::landing_for_visitor(ctx, &path).await {
                println!("redirect {home} (already signed in)");
                return Ok(());
            }
            match ctx.gate.evaluate_path(&path).await {
                Decision::Allow => println!("allow {path}"),
                Decision::RedirectToLogin { return_path } => {
                    println!("redirect /login (return to {return_path})")
                }
                Decision::RedirectToRoleHome { role, notice } => {
                    if let Some(notice) = notice {
                        eprintln!("{notice}");
                    }
                    println!("redirect {} (role {role})", role.home_path());
                }
            }
        }
        Command::Whoami => {
            let me = services::current_user(ctx).await?;
            let company = me
                .company_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".into());
            println!(
                "{} company_admin={} company={}",
                me.username,
                me.is_company_admin.unwrap_or(false),
                company
            );
        }
        Command::Routes => {
            for screen in SCREENS {
                let access = match screen.access {
                    Access::Public => "public".to_string(),
                    Access::Protected(requirement) => format!("{requirement:?}"),
                };
                println!("{:<32} {:<14} {}", screen.path, access, screen.title);
            }
        }
        Command::Consult {
            question,
            history_id,
        } => {
            let reply = ctx
                .api
                .consult(&ConsultRequest {
                    question,
                    history_id,
                })
                .await?;
            println!("{}", reply.response);
            for suggestion in reply.suggestions {
                println!("  - {suggestion}");
            }
        }
    }
    Ok(())
}

//! Command implementations

use crate::backend::{DEMO_EMAIL, DEMO_PASSWORD};
use crate::output::{self, OutputFormat};
use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use serde::Serialize;
use smartcare_session::{gate, Route, SessionManager, SignUpRequest};
use smartcare_types::ProfileFields;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show the resolved session
    Status,

    /// Sign in with email and password
    SignIn {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "SMARTCARE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Register a clinician and create their profile
    SignUp(SignUpArgs),

    /// End the session
    SignOut,

    /// Create the missing profile for the signed-in clinician
    CompleteProfile(ProfileArgs),

    /// Decide how a path is handled for the current session
    Gate {
        /// Path such as /patients
        path: String,
    },

    /// Gate decisions for every route
    Routes,

    /// Print session changes until interrupted
    Watch,

    /// Walk through sign-up, sign-out and sign-in on the in-memory backend
    Demo,

    /// Show configuration
    Config,
}

#[derive(Args)]
pub struct SignUpArgs {
    #[arg(short, long)]
    email: String,

    #[arg(short, long, env = "SMARTCARE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Defaults to the password
    #[arg(long)]
    confirm_password: Option<String>,

    #[command(flatten)]
    profile: ProfileArgs,
}

#[derive(Args)]
pub struct ProfileArgs {
    #[arg(long)]
    full_name: String,

    #[arg(long)]
    specialty: String,

    #[arg(long)]
    license_number: String,

    #[arg(long)]
    phone: String,
}

impl From<ProfileArgs> for ProfileFields {
    fn from(args: ProfileArgs) -> Self {
        ProfileFields {
            full_name: args.full_name,
            specialty: args.specialty,
            license_number: args.license_number,
            phone: args.phone,
        }
    }
}

impl From<SignUpArgs> for SignUpRequest {
    fn from(args: SignUpArgs) -> Self {
        SignUpRequest {
            confirm_password: args.confirm_password.unwrap_or_else(|| args.password.clone()),
            email: args.email,
            password: args.password,
            profile: args.profile.into(),
        }
    }
}

#[derive(Serialize)]
struct RouteDecision {
    path: &'static str,
    decision: String,
}

pub async fn execute(
    command: Commands,
    manager: &SessionManager,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Commands::Status => output::print_state(&manager.state(), format),

        Commands::SignIn { email, password } => {
            manager
                .sign_in(&email, &password)
                .await
                .context("sign-in failed")?;
            output::print_success("Signed in");
            output::print_state(&manager.state(), format)
        }

        Commands::SignUp(args) => {
            let request = SignUpRequest::from(args);
            match manager.sign_up(request).await {
                Ok(profile) => {
                    output::print_success(&format!("Registered {}", profile.full_name));
                    output::print_state(&manager.state(), format)
                }
                Err(err) if err.is_partial_sign_up() => {
                    output::print_warning(
                        "Account created but the profile could not be saved; \
                         run complete-profile while signed in",
                    );
                    output::print_state(&manager.state(), format)?;
                    Err(err).context("sign-up incomplete")
                }
                Err(err) => Err(err).context("sign-up failed"),
            }
        }

        Commands::SignOut => {
            let result = manager.sign_out().await;
            output::print_state(&manager.state(), format)?;
            result.context("provider sign-out failed; local session cleared")?;
            output::print_success("Signed out");
            Ok(())
        }

        Commands::CompleteProfile(args) => {
            let profile = manager
                .complete_profile(args.into())
                .await
                .context("profile completion failed")?;
            output::print_success(&format!("Profile saved for {}", profile.full_name));
            output::print_state(&manager.state(), format)
        }

        Commands::Gate { path } => {
            let route = Route::parse(&path);
            let decision = gate::decide(&manager.state(), route);
            match format {
                OutputFormat::Json => output::print_json(&RouteDecision {
                    path: route.path(),
                    decision: format!("{decision:?}"),
                }),
                OutputFormat::Text => {
                    println!("{} -> {}", route, output::describe_decision(decision));
                    Ok(())
                }
            }
        }

        Commands::Routes => {
            let state = manager.state();
            let decisions = Route::ALL
                .into_iter()
                .map(|route| (route, gate::decide(&state, route)))
                .collect::<Vec<_>>();
            match format {
                OutputFormat::Json => output::print_json(
                    &decisions
                        .iter()
                        .map(|(route, decision)| RouteDecision {
                            path: route.path(),
                            decision: format!("{decision:?}"),
                        })
                        .collect::<Vec<_>>(),
                ),
                OutputFormat::Text => {
                    for (route, decision) in decisions {
                        println!("{:<16} {}", route.path(), output::describe_decision(decision));
                    }
                    Ok(())
                }
            }
        }

        Commands::Watch => watch(manager, format).await,

        Commands::Demo => demo(manager, format).await,

        // Handled before the manager is built.
        Commands::Config => Ok(()),
    }
}

async fn watch(manager: &SessionManager, format: OutputFormat) -> anyhow::Result<()> {
    let mut changes = manager.watch();
    let initial = changes.borrow_and_update().clone();
    output::print_state(&initial, format)?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            changed = changes.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = changes.borrow_and_update().clone();
                output::print_state(&state, format)?;
            }
        }
    }
}

async fn demo(manager: &SessionManager, format: OutputFormat) -> anyhow::Result<()> {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _sub = manager.subscribe(move |state| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        println!("[{n}] {}", state.status());
    });

    let request = SignUpRequest {
        email: "jane.doe@smartcare.test".into(),
        password: "secret1".into(),
        confirm_password: "secret1".into(),
        profile: ProfileFields {
            full_name: "Jane Doe".into(),
            specialty: "Cardiology".into(),
            license_number: "L123".into(),
            phone: "555-0100".into(),
        },
    };
    if manager.config().min_password_length > request.password.chars().count() {
        bail!("demo password is shorter than the configured minimum");
    }

    manager.sign_up(request).await.context("demo sign-up")?;
    output::print_state(&manager.state(), format)?;
    manager.sign_out().await.context("demo sign-out")?;
    manager
        .sign_in(DEMO_EMAIL, DEMO_PASSWORD)
        .await
        .context("demo sign-in")?;
    output::print_state(&manager.state(), format)?;

    println!("{} notifications", seen.load(Ordering::SeqCst));
    Ok(())
}

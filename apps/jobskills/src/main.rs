use std::io::{self, BufRead, Write};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobskills::associations::{
    OperationError, RemoveOutcome, SkillForm, StoreSnapshot, SubmitError,
};
use jobskills::config::Config;
use jobskills::models::{AssociationId, ExperienceLevel, JobId, JobSkillAssociation};
use jobskills::Session;

#[derive(Parser)]
#[command(name = "jobskills", version, about = "Manage the skills attached to job postings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List associations, optionally for one job
    List {
        #[arg(long)]
        job: Option<String>,
    },
    /// Attach a skill to a job, registering the skill if it is new
    Add {
        #[arg(long)]
        job: String,
        #[arg(long)]
        skill: String,
        #[arg(long, default_value = "intermediate")]
        level: ExperienceLevel,
        #[arg(long)]
        required: bool,
    },
    /// Change an existing association
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        skill: Option<String>,
        #[arg(long)]
        level: Option<ExperienceLevel>,
        #[arg(long)]
        required: Option<bool>,
    },
    /// Remove an association
    Remove {
        #[arg(long)]
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Find or create a master skill by name
    Resolve { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    info!("Starting jobskills v{}", env!("CARGO_PKG_VERSION"));

    let session = Session::connect(config)?;

    match cli.command {
        Command::List { job } => {
            session.store.fetch_all().await?;
            let snapshot = session.store.snapshot().await;
            let rows: Vec<&JobSkillAssociation> = match &job {
                Some(job) => snapshot.for_job(&JobId::from(job.as_str())),
                None => snapshot.associations.iter().collect(),
            };
            for assoc in rows {
                print_association(assoc);
            }
        }
        Command::Add {
            job,
            skill,
            level,
            required,
        } => {
            // Load first so the duplicate-in-job check sees existing skills.
            session.store.fetch_all().await?;
            let mut form = SkillForm {
                skill,
                is_required: required,
                experience_level: level,
            };
            let result = session
                .controller
                .submit(&JobId::from(job.as_str()), &mut form, None)
                .await;
            report_submit(result, &session.store.snapshot().await)?;
        }
        Command::Update {
            id,
            skill,
            level,
            required,
        } => {
            session.store.fetch_all().await?;
            let id = AssociationId::from(id.as_str());
            let Some(current) = session.store.get(&id).await else {
                bail!("Association {id} not found");
            };
            let Some(mut form) = session.controller.edit(&id).await else {
                bail!("Association {id} not found");
            };
            if let Some(skill) = skill {
                form.skill = skill;
            }
            if let Some(level) = level {
                form.experience_level = level;
            }
            if let Some(required) = required {
                form.is_required = required;
            }
            let result = session
                .controller
                .submit(&current.job_id, &mut form, Some(&id))
                .await;
            report_submit(result, &session.store.snapshot().await)?;
        }
        Command::Remove { id, yes } => {
            session.store.fetch_all().await?;
            let id = AssociationId::from(id.as_str());
            let gate = |id: &AssociationId, target: Option<&JobSkillAssociation>| {
                yes || prompt_confirm(id, target)
            };
            match session.controller.remove(&id, &gate).await? {
                RemoveOutcome::Removed => println!("Removed {id}"),
                RemoveOutcome::Cancelled => println!("Cancelled"),
            }
        }
        Command::Resolve { name } => {
            let skill = session.resolver.resolve(&name).await?;
            println!("{}\t{}", skill.id, skill.name);
        }
    }

    Ok(())
}

fn print_association(assoc: &JobSkillAssociation) {
    println!(
        "{}\tjob={}\t{}\t{}{}",
        assoc.id,
        assoc.job_id,
        assoc.skill,
        assoc.experience_level,
        if assoc.is_required { "\trequired" } else { "" }
    );
}

fn report_submit(
    result: Result<JobSkillAssociation, SubmitError>,
    snapshot: &StoreSnapshot,
) -> Result<()> {
    match result {
        Ok(saved) => {
            if let Some(msg) = &snapshot.success_message {
                println!("{msg}");
            }
            print_association(&saved);
            Ok(())
        }
        Err(SubmitError::Invalid(errors)) => {
            for e in &errors {
                eprintln!("{}: {}", e.field, e.message);
            }
            bail!("Invalid input")
        }
        Err(SubmitError::Api(err)) => {
            match &snapshot.error {
                Some(OperationError::Fields(fields)) => {
                    for (field, msgs) in fields {
                        for msg in msgs {
                            eprintln!("{field}: {msg}");
                        }
                    }
                }
                _ => eprintln!("{}", err.user_message()),
            }
            bail!("Request failed")
        }
        Err(err) => bail!(err),
    }
}

fn prompt_confirm(id: &AssociationId, target: Option<&JobSkillAssociation>) -> bool {
    match target {
        Some(assoc) => eprint!("Remove '{}' from job {}? [y/N] ", assoc.skill, assoc.job_id),
        None => eprint!("Association {id} is not loaded. Remove anyway? [y/N] "),
    }
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

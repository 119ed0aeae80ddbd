use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::api::ApiClient;
use crate::cli::Invocation;
use crate::config::Config;
use crate::dashboard::{Dashboard, TaskForm};
use crate::filter::StatusFilter;
use crate::render::Renderer;
use crate::session::{Credentials, Gate, Session, SessionState, SessionStore};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list",
        "add",
        "modify",
        "done",
        "delete",
        "login",
        "logout",
        "register",
        "whoami",
        "health",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub async fn dispatch(
    store: &SessionStore,
    cfg: &Config,
    renderer: &mut Renderer,
    base: &str,
    assume_yes: bool,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();

    debug!(
        command,
        filter = ?inv.filter,
        args = ?inv.command_args,
        "dispatching command"
    );

    match command {
        "login" => return cmd_login(store, base, &inv.command_args).await,
        "logout" => return cmd_logout(store),
        "register" => return cmd_register(base, &inv.command_args).await,
        "whoami" => return cmd_whoami(store),
        "health" => return cmd_health(base).await,
        "help" => return cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let session = match store.state().gate() {
        Gate::Wait => {
            renderer.print_wait_indicator()?;
            return Ok(());
        }
        Gate::RedirectToLogin => {
            info!("no active session; redirecting to login");
            println!("Not signed in. Run `taskdeck login` first.");
            return Ok(());
        }
        Gate::Ready(session) => session,
    };

    let client = ApiClient::new(base, Some(&session))?;
    let mut dashboard = Dashboard::new(client);

    match command {
        "list" => cmd_list(&mut dashboard, renderer, &inv).await,
        "add" => cmd_add(&mut dashboard, renderer, &inv.command_args).await,
        "modify" => cmd_modify(&mut dashboard, renderer, &inv.command_args).await,
        "done" => cmd_done(&mut dashboard, renderer, &inv.command_args).await,
        "delete" => {
            cmd_delete(&mut dashboard, renderer, cfg, assume_yes, &inv.command_args).await
        }
        other => Err(anyhow::anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(dashboard, renderer, inv))]
async fn cmd_list(
    dashboard: &mut Dashboard,
    renderer: &mut Renderer,
    inv: &Invocation,
) -> anyhow::Result<()> {
    info!("command list");

    let filter = inv
        .filter
        .or_else(|| inv.command_args.first().and_then(|t| StatusFilter::parse(t)))
        .unwrap_or_default();

    dashboard.set_filter(filter).await;
    render_dashboard(dashboard, renderer)
}

#[instrument(skip(dashboard, renderer, args))]
async fn cmd_add(
    dashboard: &mut Dashboard,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command add");

    let (title, description) = parse_form_args(args);
    dashboard.open_create();
    dashboard
        .create(TaskForm::new(title, description.unwrap_or_default()))
        .await;

    render_dashboard(dashboard, renderer)
}

#[instrument(skip(dashboard, renderer, args))]
async fn cmd_modify(
    dashboard: &mut Dashboard,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command modify");

    let id = parse_task_id(args)?;
    dashboard.load().await;

    let Some(task) = dashboard.tasks().iter().find(|t| t.id == id).cloned() else {
        println!("Task {id} not found.");
        return Ok(());
    };

    let mut form = TaskForm::from_task(&task);
    let (title, description) = parse_form_args(&args[1..]);
    if !title.trim().is_empty() {
        form.title = title;
    }
    if let Some(description) = description {
        form.description = description;
    }

    dashboard.open_edit(task);
    dashboard.update(form).await;

    render_dashboard(dashboard, renderer)
}

#[instrument(skip(dashboard, renderer, args))]
async fn cmd_done(
    dashboard: &mut Dashboard,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command done");

    let id = parse_task_id(args)?;
    dashboard.toggle(id).await;

    render_dashboard(dashboard, renderer)
}

#[instrument(skip(dashboard, renderer, cfg, args))]
async fn cmd_delete(
    dashboard: &mut Dashboard,
    renderer: &mut Renderer,
    cfg: &Config,
    assume_yes: bool,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command delete");

    let id = parse_task_id(args)?;
    let confirmed = if assume_yes || !cfg.get_bool("confirmation").unwrap_or(true) {
        true
    } else {
        confirm_delete(id)?
    };

    dashboard.delete(id, confirmed).await;
    if !confirmed {
        println!("Delete cancelled.");
        return Ok(());
    }

    render_dashboard(dashboard, renderer)
}

#[instrument(skip(store, base, args))]
async fn cmd_login(store: &SessionStore, base: &str, args: &[String]) -> anyhow::Result<()> {
    info!("command login");

    let email = match args.first() {
        Some(email) => email.clone(),
        None => read_line("Email: ")?,
    };
    let password = match args.get(1) {
        Some(password) => password.clone(),
        None => read_line("Password: ")?,
    };

    let client = ApiClient::new(base, None)?;
    match client
        .login(&Credentials {
            email: email.clone(),
            password,
        })
        .await
    {
        Ok(response) => {
            let session = Session {
                token: response.access_token,
                email: response
                    .user
                    .map(|user| user.email)
                    .or(Some(email)),
            };
            store.save(&session)?;
            println!(
                "Signed in as {}.",
                session.email.as_deref().unwrap_or("(unknown)")
            );
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "login failed");
            println!("Login failed.");
            Ok(())
        }
    }
}

#[instrument(skip(store))]
fn cmd_logout(store: &SessionStore) -> anyhow::Result<()> {
    info!("command logout");
    store.clear()?;
    println!("Signed out.");
    Ok(())
}

#[instrument(skip(base, args))]
async fn cmd_register(base: &str, args: &[String]) -> anyhow::Result<()> {
    info!("command register");

    let email = match args.first() {
        Some(email) => email.clone(),
        None => read_line("Email: ")?,
    };
    let password = match args.get(1) {
        Some(password) => password.clone(),
        None => read_line("Password: ")?,
    };

    let client = ApiClient::new(base, None)?;
    match client.register(&Credentials { email, password }).await {
        Ok(user) => {
            println!("Account created for {}. Run `taskdeck login`.", user.email);
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "registration failed");
            println!("Registration failed.");
            Ok(())
        }
    }
}

#[instrument(skip(store))]
fn cmd_whoami(store: &SessionStore) -> anyhow::Result<()> {
    match store.state() {
        SessionState::SignedIn(session) => {
            println!("{}", session.email.as_deref().unwrap_or("(unknown)"));
        }
        SessionState::SignedOut => {
            println!("Not signed in.");
        }
        SessionState::Unresolved => {
            println!("Session state unresolved; check the data directory.");
        }
    }
    Ok(())
}

#[instrument(skip(base))]
async fn cmd_health(base: &str) -> anyhow::Result<()> {
    let client = ApiClient::new(base, None)?;
    match client.health().await {
        Ok(health) => {
            println!("{}", health.status);
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "health check failed");
            println!("Service unreachable.");
            Ok(())
        }
    }
}

fn cmd_help() -> anyhow::Result<()> {
    println!("usage: taskdeck [all|pending|completed] <command> [args]");
    println!();
    println!("  list                    show the task list for the active filter");
    println!("  add <title> [desc:...]  create a task");
    println!("  modify <id> [title] [desc:...]");
    println!("                          edit a task's title or description");
    println!("  done <id>               toggle a task's completion");
    println!("  delete <id>             delete a task (asks for confirmation)");
    println!("  login / logout / whoami manage the signed-in session");
    println!("  register                create an account");
    println!("  health                  check the remote service");
    Ok(())
}

fn render_dashboard(dashboard: &mut Dashboard, renderer: &mut Renderer) -> anyhow::Result<()> {
    if let Some(notification) = dashboard.take_notification() {
        renderer.print_notification(&notification)?;
    }
    renderer.print_task_table(dashboard.tasks())?;
    renderer.print_summary(dashboard.pending_count(), dashboard.completed_count())?;
    Ok(())
}

fn parse_task_id(args: &[String]) -> anyhow::Result<i64> {
    let raw = args.first().context("a task id is required")?;
    raw.parse::<i64>()
        .with_context(|| format!("invalid task id: {raw}"))
}

fn parse_form_args(args: &[String]) -> (String, Option<String>) {
    let mut title_words: Vec<&str> = vec![];
    let mut description_words: Vec<&str> = vec![];

    for arg in args {
        if let Some(rest) = arg
            .strip_prefix("description:")
            .or_else(|| arg.strip_prefix("desc:"))
        {
            if !rest.is_empty() {
                description_words.push(rest);
            }
            continue;
        }
        title_words.push(arg);
    }

    let description = if description_words.is_empty() {
        None
    } else {
        Some(description_words.join(" "))
    };

    (title_words.join(" "), description)
}

fn confirm_delete(id: i64) -> anyhow::Result<bool> {
    if !io::stdin().is_terminal() {
        warn!(id, "stdin is not a terminal; refusing delete without --yes");
        return Ok(false);
    }

    eprint!("Delete task {id}? (y/n) ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed reading stdin")?;

    Ok(matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn read_line(prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed reading stdin")?;

    Ok(line.trim().to_string())
}

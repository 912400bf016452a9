mod logging;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use garden_client::models::{
    parse_schedule_date, CareSchedule, CareScheduleDraft, CareSchedulePatch, CareTask, Comment,
    CommentDraft, ForumPost, ForumPostDraft, ForumPostPatch, Interval, Layout, LayoutData,
    LayoutDraft, LayoutPatch, Plant, PlantDraft, PlantPatch, ReactionKind, Tip, TipDraft,
    TipPatch,
};
use garden_client::{
    CareSchedules, ClientConfig, Comments, FileStorage, ForumPosts, Form, GardenClient,
    GardenClientError, Layouts, NoticeLevel, Plants, RepeatPolicy, Resource, ResourceView,
    Saved, SessionHolder, Tips,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::mpsc;

const LOGIN_HINT: &str = "garden login --email <email> --password <password>";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// API origin, overrides GARDEN_API_URL
    #[arg(short, long)]
    server: Option<String>,

    /// Where the session is kept, overrides GARDEN_SESSION_FILE
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Print entities as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    Logout,

    /// Exchange the refresh token for a new access token
    Refresh,

    Status,

    Plants {
        #[command(subcommand)]
        action: PlantCommand,
    },

    /// Care schedules of one plant
    Schedules {
        #[command(subcommand)]
        action: ScheduleCommand,
    },

    Forum {
        #[command(subcommand)]
        action: ForumCommand,
    },

    Tips {
        #[command(subcommand)]
        action: TipCommand,
    },

    Layouts {
        #[command(subcommand)]
        action: LayoutCommand,
    },

    /// Announce due care tasks until interrupted
    Watch {
        #[arg(long, required = true)]
        plant: Vec<i64>,

        /// Announce each occurrence once instead of on every check
        #[arg(long)]
        once_per_occurrence: bool,
    },
}

#[derive(Subcommand)]
enum PlantCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        species: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        img_url: Option<String>,
    },
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        species: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        img_url: Option<String>,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum ScheduleCommand {
    List {
        #[arg(long)]
        plant: i64,
    },
    Add {
        #[arg(long)]
        plant: i64,
        /// WATERING, PRUNING, FERTILIZING, HARVESTING or free text
        #[arg(long)]
        task: String,
        /// First occurrence, defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// DAILY, WEEKLY, FORTNIGHTLY or MONTHLY
        #[arg(long, default_value = "DAILY")]
        interval: String,
    },
    Update {
        #[arg(long)]
        plant: i64,
        #[arg(long)]
        id: i64,
        #[arg(long)]
        task: Option<String>,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        interval: Option<String>,
    },
    Delete {
        #[arg(long)]
        plant: i64,
        #[arg(long)]
        id: i64,
    },
    /// Show what is due, today unless --on is given
    Due {
        #[arg(long)]
        plant: i64,
        #[arg(long, value_parser = parse_date)]
        on: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum ForumCommand {
    List,
    Post {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
    Comments {
        #[arg(long)]
        post: i64,
    },
    Comment {
        #[arg(long)]
        post: i64,
        #[arg(long)]
        content: String,
    },
    EditComment {
        #[arg(long)]
        post: i64,
        #[arg(long)]
        id: i64,
        #[arg(long)]
        content: String,
    },
    DeleteComment {
        #[arg(long)]
        post: i64,
        #[arg(long)]
        id: i64,
    },
    React {
        #[arg(long)]
        post: i64,
        #[arg(long, value_enum)]
        kind: Reaction,
    },
    Reply {
        #[arg(long)]
        post: i64,
        #[arg(long)]
        comment: i64,
        #[arg(long)]
        content: String,
    },
}

#[derive(Subcommand)]
enum TipCommand {
    List,
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum LayoutCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        /// Layout as JSON, e.g. '{"beds":[{"name":"North","plants":["Basil"]}]}'
        #[arg(long)]
        data: String,
    },
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        data: Option<String>,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Reaction {
    Like,
    Dislike,
}

impl From<Reaction> for ReactionKind {
    fn from(reaction: Reaction) -> Self {
        match reaction {
            Reaction::Like => ReactionKind::Like,
            Reaction::Dislike => ReactionKind::Dislike,
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    parse_schedule_date(raw).ok_or_else(|| format!("expected YYYY-MM-DD, got {:?}", raw))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[tokio::main]
async fn main() {
    logging::init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        if e
            .downcast_ref::<GardenClientError>()
            .is_some_and(GardenClientError::is_unauthorized)
        {
            eprintln!("   Please login first: {}", LOGIN_HINT);
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::from_env().context("Invalid configuration")?;
    if let Some(server) = cli.server {
        config.base_url = server;
    }

    let session_path = match cli.session_file.or_else(|| config.session_file.clone()) {
        Some(path) => path,
        None => FileStorage::default_path()?,
    };
    let session = SessionHolder::new(Arc::new(FileStorage::new(session_path.clone())));
    let client = GardenClient::new(config, session).context("Failed to create garden client")?;
    let json = cli.json;

    match cli.command {
        Commands::Register {
            username,
            email,
            password,
        } => {
            println!("📝 Registering user: {}", username.bold());
            let response = client
                .register(username.as_str(), email.as_str(), password.as_str())
                .await?;
            success(response.msg.as_deref().unwrap_or("Registration successful"));
            if client.is_signed_in() {
                println!("   Signed in as {}", username);
            } else {
                println!("   Next: garden login --email {} --password <password>", email);
            }
        }

        Commands::Login { email, password } => {
            println!("🔑 Logging in as: {}", email.bold());
            client.login(email.as_str(), password.as_str()).await?;
            let username = client.session().username().unwrap_or(email);
            success(&format!("Logged in as {}", username));
            println!("   Session saved to {:?}", session_path);
        }

        Commands::Logout => {
            client.logout().await?;
            success("Logged out");
        }

        Commands::Refresh => {
            client.refresh().await?;
            success("Access token refreshed");
        }

        Commands::Status => match client.session().snapshot() {
            Some(session) => {
                println!("🔑 Session file: {:?}", session_path);
                println!(
                    "   User: {}",
                    session.username.as_deref().unwrap_or("unknown")
                );
                println!("   Token: {}...", preview(&session.access_token));
                println!("   Status: {}", "signed in".green());
            }
            None => {
                println!("{} Not signed in", "✗".yellow());
                println!("   Please login first: {}", LOGIN_HINT);
            }
        },

        Commands::Plants { action } => plants(&client, action, json).await?,
        Commands::Schedules { action } => schedules(&client, action, json).await?,
        Commands::Forum { action } => forum(&client, action, json).await?,
        Commands::Tips { action } => tips(&client, action, json).await?,
        Commands::Layouts { action } => layouts(&client, action, json).await?,

        Commands::Watch {
            plant,
            once_per_occurrence,
        } => {
            let policy = if once_per_occurrence {
                RepeatPolicy::OncePerOccurrence
            } else {
                RepeatPolicy::EveryTick
            };
            watch(&client, plant, policy).await?;
        }
    }

    Ok(())
}

// ==================== Команды ресурсов ====================

async fn plants(client: &GardenClient, action: PlantCommand, json: bool) -> Result<()> {
    match action {
        PlantCommand::List => {
            let plants = list(client, Plants).await?;
            print_items(&plants, json, "No plants yet")?;
        }
        PlantCommand::Add {
            name,
            species,
            description,
            img_url,
        } => {
            let draft = PlantDraft {
                name,
                species,
                description,
                img_url,
            };
            let plant = save(client, Plants, Form::Add(draft)).await?;
            print_saved(&plant, json)?;
        }
        PlantCommand::Update {
            id,
            name,
            species,
            description,
            img_url,
        } => {
            let patch = PlantPatch {
                name,
                species,
                description,
                img_url,
            };
            let plant = save(client, Plants, Form::Edit { id, patch }).await?;
            print_saved(&plant, json)?;
        }
        PlantCommand::Delete { id } => remove(client, Plants, id).await?,
    }
    Ok(())
}

async fn schedules(client: &GardenClient, action: ScheduleCommand, json: bool) -> Result<()> {
    match action {
        ScheduleCommand::List { plant } => {
            let schedules = list(client, CareSchedules::for_plant(plant)).await?;
            print_items(&schedules, json, "No care schedules for this plant")?;
        }
        ScheduleCommand::Add {
            plant,
            task,
            date,
            interval,
        } => {
            let draft = CareScheduleDraft {
                plant_id: plant,
                task: CareTask::from(task.as_str()),
                schedule_date: date.unwrap_or_else(today),
                interval: Interval::from(interval.as_str()),
            };
            let schedule = save(client, CareSchedules::for_plant(plant), Form::Add(draft)).await?;
            print_saved(&schedule, json)?;
        }
        ScheduleCommand::Update {
            plant,
            id,
            task,
            date,
            interval,
        } => {
            let patch = CareSchedulePatch {
                task: task.as_deref().map(CareTask::from),
                schedule_date: date,
                interval: interval.as_deref().map(Interval::from),
            };
            let schedule = save(
                client,
                CareSchedules::for_plant(plant),
                Form::Edit { id, patch },
            )
            .await?;
            print_saved(&schedule, json)?;
        }
        ScheduleCommand::Delete { plant, id } => {
            remove(client, CareSchedules::for_plant(plant), id).await?
        }
        ScheduleCommand::Due { plant, on } => {
            let day = on.unwrap_or_else(today);
            let schedules = list(client, CareSchedules::for_plant(plant)).await?;
            let notices = client.due_notifier().evaluate(&schedules, day);
            if notices.is_empty() {
                println!("   Nothing due on {}", day);
            }
            for notice in &notices {
                println!("⏰ {}", notice.message().yellow().bold());
            }
        }
    }
    Ok(())
}

async fn forum(client: &GardenClient, action: ForumCommand, json: bool) -> Result<()> {
    match action {
        ForumCommand::List => {
            let posts = list(client, ForumPosts).await?;
            print_items(&posts, json, "No posts yet")?;
        }
        ForumCommand::Post { title, content } => {
            let draft = ForumPostDraft { title, content };
            let post = save(client, ForumPosts, Form::Add(draft)).await?;
            print_saved(&post, json)?;
        }
        ForumCommand::Update { id, title, content } => {
            let patch = ForumPostPatch { title, content };
            let post = save(client, ForumPosts, Form::Edit { id, patch }).await?;
            print_saved(&post, json)?;
        }
        ForumCommand::Delete { id } => remove(client, ForumPosts, id).await?,
        ForumCommand::Comments { post } => {
            let comments = list(client, Comments::on_post(post)).await?;
            print_items(&comments, json, "No comments yet")?;
        }
        ForumCommand::Comment { post, content } => {
            let draft = CommentDraft::new(content);
            let comment = save(client, Comments::on_post(post), Form::Add(draft)).await?;
            print_saved(&comment, json)?;
        }
        ForumCommand::EditComment { post, id, content } => {
            let patch = CommentDraft::new(content);
            let comment = save(client, Comments::on_post(post), Form::Edit { id, patch }).await?;
            print_saved(&comment, json)?;
        }
        ForumCommand::DeleteComment { post, id } => {
            remove(client, Comments::on_post(post), id).await?
        }
        ForumCommand::React { post, kind } => {
            let reactions = client.react(post, kind.into()).await?;
            success(&format!(
                "Post #{} now has 👍 {} 👎 {}",
                post, reactions.like, reactions.dislike
            ));
        }
        ForumCommand::Reply {
            post,
            comment,
            content,
        } => {
            let reply = client.reply(post, comment, content).await?;
            success("Reply posted");
            print_item(&reply, json)?;
        }
    }
    Ok(())
}

async fn tips(client: &GardenClient, action: TipCommand, json: bool) -> Result<()> {
    match action {
        TipCommand::List => {
            let tips = list(client, Tips).await?;
            print_items(&tips, json, "No tips yet")?;
        }
        TipCommand::Add { title, content } => {
            let tip = save(client, Tips, Form::Add(TipDraft { title, content })).await?;
            print_saved(&tip, json)?;
        }
        TipCommand::Update { id, title, content } => {
            let patch = TipPatch { title, content };
            let tip = save(client, Tips, Form::Edit { id, patch }).await?;
            print_saved(&tip, json)?;
        }
        TipCommand::Delete { id } => remove(client, Tips, id).await?,
    }
    Ok(())
}

async fn layouts(client: &GardenClient, action: LayoutCommand, json: bool) -> Result<()> {
    match action {
        LayoutCommand::List => {
            let layouts = list(client, Layouts).await?;
            print_items(&layouts, json, "No layouts yet")?;
        }
        LayoutCommand::Add { name, data } => {
            let layout_data = LayoutData::parse(&data).context("Invalid layout JSON")?;
            let draft = LayoutDraft { name, layout_data };
            let layout = save(client, Layouts, Form::Add(draft)).await?;
            print_saved(&layout, json)?;
        }
        LayoutCommand::Update { id, name, data } => {
            let layout_data = match data {
                Some(raw) => Some(LayoutData::parse(&raw).context("Invalid layout JSON")?),
                None => None,
            };
            let patch = LayoutPatch { name, layout_data };
            let layout = save(client, Layouts, Form::Edit { id, patch }).await?;
            print_saved(&layout, json)?;
        }
        LayoutCommand::Delete { id } => remove(client, Layouts, id).await?,
    }
    Ok(())
}

async fn watch(client: &GardenClient, plant_ids: Vec<i64>, policy: RepeatPolicy) -> Result<()> {
    let mut views = Vec::new();
    for plant_id in plant_ids {
        views.push(mounted(client, CareSchedules::for_plant(plant_id)).await?);
    }

    let notifier = client.due_notifier().with_policy(policy);
    let loaded: usize = views.iter().map(|view| view.items().len()).sum();
    println!(
        "👀 Watching {} schedule(s), checking every {}s. Press Ctrl-C to stop.",
        loaded,
        notifier.period().as_secs()
    );

    let (tx, mut rx) = mpsc::channel(16);
    let handle = notifier.spawn(views.clone(), tx);

    loop {
        tokio::select! {
            Some(notice) = rx.recv() => {
                println!("⏰ {} {}", notice.occurrence, notice.message().yellow().bold());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    for view in &views {
        view.unmount();
    }
    handle.abort();
    println!("Stopped watching");
    Ok(())
}

// ==================== Работа с представлениями ====================

/// Success notices are printed; a failure carries its notice title as context.
fn finish<R: Resource, T>(
    view: &ResourceView<R>,
    result: Result<T, GardenClientError>,
) -> Result<T> {
    let mut failure = None;
    for notice in view.take_notices() {
        match notice.level {
            NoticeLevel::Success => match &notice.description {
                Some(detail) => success(&format!("{} ({})", notice.title, detail)),
                None => success(&notice.title),
            },
            NoticeLevel::Error => failure = Some(notice.title),
        }
    }

    match (result, failure) {
        (Ok(value), _) => Ok(value),
        (Err(e), Some(title)) => Err(anyhow::Error::new(e).context(title)),
        (Err(e), None) => Err(e.into()),
    }
}

async fn mounted<R: Resource>(client: &GardenClient, resource: R) -> Result<ResourceView<R>> {
    let view = client.view(resource);
    let result = view.mount().await;
    finish(&view, result)?;
    Ok(view)
}

async fn list<R: Resource>(client: &GardenClient, resource: R) -> Result<Vec<R::Entity>> {
    Ok(mounted(client, resource).await?.items())
}

async fn save<R: Resource>(
    client: &GardenClient,
    resource: R,
    form: Form<R>,
) -> Result<Saved<R::Entity>> {
    let view = mounted(client, resource).await?;
    let result = match form {
        Form::Add(draft) => {
            view.open_add(draft);
            view.submit().await
        }
        Form::Edit { id, patch } => match view.open_edit(id, patch) {
            Ok(()) => view.submit().await,
            Err(e) => Err(e),
        },
    };
    finish(&view, result)
}

async fn remove<R: Resource>(client: &GardenClient, resource: R, id: i64) -> Result<()> {
    let view = mounted(client, resource).await?;
    view.request_delete(id);
    let result = view.confirm_delete().await;
    finish(&view, result)
}

// ==================== Вывод ====================

trait Describe {
    fn describe(&self) -> String;
}

impl Describe for Plant {
    fn describe(&self) -> String {
        let mut line = format!("[{}] {}", self.id, self.name.bold());
        if let Some(species) = &self.species {
            line.push_str(&format!(" ({})", species.italic()));
        }
        if let Some(description) = &self.description {
            line.push_str(&format!("\n      {}", truncate(description, 60)));
        }
        line
    }
}

impl Describe for CareSchedule {
    fn describe(&self) -> String {
        let today = today();
        let when = if self.is_due_on(today) {
            "due today".yellow().bold().to_string()
        } else {
            match self.next_occurrence(today) {
                Some(next) => format!("next on {}", next),
                None => "never due".dimmed().to_string(),
            }
        };
        format!(
            "[{}] {} {} from {}, {}",
            self.id,
            self.task.to_string().bold(),
            self.interval.as_str(),
            self.schedule_date,
            when
        )
    }
}

impl Describe for ForumPost {
    fn describe(&self) -> String {
        let author = self
            .author
            .as_ref()
            .map(|a| a.username.as_str())
            .unwrap_or("anonymous");
        format!(
            "[{}] {} by {}  👍 {} 👎 {}, {} comment(s)\n      {}",
            self.id,
            self.title.bold(),
            author,
            self.reactions.like,
            self.reactions.dislike,
            self.comments.len(),
            truncate(&self.content, 60)
        )
    }
}

impl Describe for Comment {
    fn describe(&self) -> String {
        let author = self
            .author
            .as_ref()
            .map(|a| a.username.as_str())
            .unwrap_or("anonymous");
        let mut text = format!("[{}] {}: {}", self.id, author.bold(), self.content);
        for reply in &self.replies {
            text.push_str(&format!("\n      ↳ {}", reply.describe()));
        }
        text
    }
}

impl Describe for Tip {
    fn describe(&self) -> String {
        format!(
            "[{}] {}\n      {}",
            self.id,
            self.title.bold(),
            truncate(&self.content, 60)
        )
    }
}

impl Describe for Layout {
    fn describe(&self) -> String {
        let summary = match &self.layout_data {
            LayoutData::Beds(beds) => format!("{} bed(s)", beds.len()),
            LayoutData::Placements(placements) => format!("{} placed plant(s)", placements.len()),
        };
        format!("[{}] {}: {}", self.id, self.name.bold(), summary)
    }
}

fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

fn print_items<T: Serialize + Describe>(items: &[T], json: bool, empty: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("   {}", empty.dimmed());
    }
    for item in items {
        println!("   {}", item.describe());
    }
    Ok(())
}

fn print_item<T: Serialize + Describe>(item: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(item)?);
    } else {
        println!("   {}", item.describe());
    }
    Ok(())
}

/// A confirmation-only save has already been announced by its notice.
fn print_saved<T: Serialize + Describe>(saved: &Saved<T>, json: bool) -> Result<()> {
    match saved {
        Saved::Entity(item) => print_item(item, json),
        Saved::Acknowledged { message } if json => {
            let body = serde_json::json!({ "message": message });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Saved::Acknowledged { .. } => Ok(()),
    }
}

fn preview(token: &str) -> String {
    token.chars().take(12).collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}

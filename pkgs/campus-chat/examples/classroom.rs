use anyhow::Result;
use async_trait::async_trait;
use campus_chat::{
    Attachment, ChatClient, ChatConfig, ChatError, ConversationSummary, DirectoryEntry,
    FileUploader, GroupInfo, MessageContent, Participant, RequestOutcome, Role, SendTarget,
    StaticDirectory, UploadFile,
};
use campus_store::{CampusStore, StoreConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Campus Chat - classroom walkthrough
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(short, long, default_value = "classroom.db")]
    database: PathBuf,

    /// School (tenant) id
    #[arg(short, long, default_value = "school-1")]
    tenant: String,

    /// Seconds a typing indicator stays on without keystrokes
    #[arg(long, default_value = "3")]
    typing_ttl: u64,
}

/// Pretends to store files and hands back a URL
struct PretendUploader;

#[async_trait]
impl FileUploader for PretendUploader {
    async fn upload(&self, file: UploadFile) -> campus_chat::Result<Attachment> {
        if file.bytes.is_empty() {
            return Err(ChatError::Upload(format!("{} is empty", file.name)));
        }
        Ok(Attachment {
            url: format!("https://files.example/{}", uuid::Uuid::new_v4()),
            name: file.name,
            mime_type: file.mime_type,
        })
    }
}

fn print_conversations(who: &str, conversations: &[ConversationSummary]) {
    println!("\n💬 {}'s conversations:", who);
    if conversations.is_empty() {
        println!("   (none)");
    }
    for c in conversations {
        println!(
            "   {:<12} {:<28} unread={} {}{}",
            c.display_name,
            c.last_message_preview,
            c.unread_count,
            if c.is_online { "🟢" } else { "⚪" },
            if c.is_typing { " ✍️" } else { "" },
        );
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let tenant = args.tenant.as_str();

    let store = CampusStore::open(StoreConfig {
        db_path: args.database.clone(),
        ..Default::default()
    })
    .await?;

    let directory = StaticDirectory::new()
        .with_participant(DirectoryEntry::new(
            Participant::new("teacher-rivera", tenant, Role::Teacher),
            "Ms. Rivera",
        ))
        .with_participant(DirectoryEntry::new(
            Participant::new("student-sam", tenant, Role::Student),
            "Sam",
        ))
        .with_participant(DirectoryEntry::new(
            Participant::new("student-alex", tenant, Role::Student),
            "Alex",
        ))
        .with_group(
            GroupInfo::new("class-7b", "Class 7B"),
            &["teacher-rivera", "student-sam", "student-alex"],
        );

    let config = ChatConfig {
        typing_ttl: Duration::from_secs(args.typing_ttl),
        ..Default::default()
    };

    let connect = |id: &str| {
        let directory = Arc::new(directory.signed_in_as(id));
        let config = config.clone();
        let store = store.clone();
        async move { ChatClient::connect(&store, directory, config).await }
    };

    let teacher = connect("teacher-rivera").await?;
    let sam = connect("student-sam").await?;
    let alex = connect("student-alex").await?;
    info!("Three sessions connected to {}", args.database.display());

    teacher
        .send_message(
            SendTarget::Direct("student-sam".into()),
            MessageContent::text("Homework due Friday"),
        )
        .await?;
    teacher
        .send_file(
            SendTarget::Group("class-7b".into()),
            Some("Worksheet for tomorrow".into()),
            UploadFile {
                name: "worksheet.pdf".into(),
                mime_type: "application/pdf".into(),
                bytes: b"%PDF-1.7".to_vec(),
            },
            &PretendUploader,
        )
        .await?;
    settle().await;
    print_conversations("Sam", &sam.conversations());

    println!("\n🔒 Sam -> Alex before consent:");
    match sam
        .send_message(
            SendTarget::Direct("student-alex".into()),
            MessageContent::text("want to study together?"),
        )
        .await
    {
        Err(e) => println!("   refused: {}", e),
        Ok(_) => println!("   delivered (consent granted in an earlier run)"),
    }

    if let RequestOutcome::Created(request) = sam.request_chat("student-alex").await? {
        println!("   request {} is {}", request.id, request.status);
    }
    for request in alex.incoming_requests().await? {
        let accepted = alex.accept_request(&request.id).await?;
        println!("   Alex {} Sam's request", accepted.status);
    }

    sam.keystroke(&campus_chat::ConversationKey::Direct("student-alex".into()))
        .await;
    settle().await;
    print_conversations("Alex", &alex.conversations());

    sam.send_message(
        SendTarget::Direct("student-alex".into()),
        MessageContent::text("want to study together?"),
    )
    .await?;
    settle().await;
    print_conversations("Alex", &alex.conversations());

    let read = sam
        .mark_read(&campus_chat::ConversationKey::Direct("teacher-rivera".into()))
        .await?;
    println!("\n📖 Sam read {} message(s)", read);
    settle().await;
    print_conversations("Sam", &sam.conversations());

    teacher.shutdown().await;
    sam.shutdown().await;
    alex.shutdown().await;
    Ok(())
}

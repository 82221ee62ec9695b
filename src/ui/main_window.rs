use std::path::{Path, PathBuf};

use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::api::models::{Attachment, ConversationId, Draft, MessageId, Role};
use crate::app::AppState;
use crate::error::{ChatError, Result};
use crate::sync::session::{AttachmentState, ChatSession};
use crate::sync::unread::UnreadPoller;
use crate::ui::chat_view::ChatView;
use crate::ui::sidebar::Sidebar;

const CUSTOMER_HELP: &str = "Commands: /open, /close, /file <path>, /download <message id> <path>, /help, /quit. Anything else is sent as a message.";
const ADMIN_HELP: &str = "Commands: /list, /select <conversation id>, /user <user id>, /file <path>, /download <message id> <path>, /help, /quit. Anything else is sent as a message.";

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Quit,
    Help,
    Open,
    Close,
    List,
    Select(ConversationId),
    User(i64),
    Attach(PathBuf),
    Download(MessageId, PathBuf),
    Text(String),
    Invalid(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Input::Text(line.to_string());
        };
        let (cmd, arg) = match rest.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (rest, ""),
        };
        match (cmd, arg) {
            ("quit" | "q", _) => Input::Quit,
            ("help" | "h", _) => Input::Help,
            ("open", _) => Input::Open,
            ("close", _) => Input::Close,
            ("list", _) => Input::List,
            ("select", id) => id
                .parse()
                .map(Input::Select)
                .unwrap_or_else(|_| Input::Invalid("usage: /select <conversation id>".into())),
            ("user", id) => id
                .parse()
                .map(Input::User)
                .unwrap_or_else(|_| Input::Invalid("usage: /user <user id>".into())),
            ("file", path) if !path.is_empty() => Input::Attach(PathBuf::from(path)),
            ("download", args) => match args.split_once(char::is_whitespace) {
                Some((id, path)) if !path.trim().is_empty() => match id.parse() {
                    Ok(id) => Input::Download(id, PathBuf::from(path.trim())),
                    Err(_) => Input::Invalid("usage: /download <message id> <path>".into()),
                },
                _ => Input::Invalid("usage: /download <message id> <path>".into()),
            },
            (other, _) => Input::Invalid(format!("unknown command /{}", other)),
        }
    }
}

pub async fn run_customer(state: &AppState) -> Result<()> {
    let api = state.api_client()?;
    let poller = UnreadPoller::spawn(api.clone(), state.unread_poll_interval());
    let mut session = ChatSession::new(api, Role::Customer, state.session_options()?);
    println!("{} {}", ChatView::badge(poller.count()), CUSTOMER_HELP);
    let res = console(&mut session, Some(&poller)).await;
    session.close().await;
    res
}

pub async fn run_admin(state: &AppState) -> Result<()> {
    let api = state.api_client()?;
    let mut session = ChatSession::new(api, Role::Admin, state.session_options()?);
    session.show().await;
    println!("{}", Sidebar::render(session.conversations(), session.active_id()));
    println!("{}", ChatView::render(&session));
    println!("{}", ADMIN_HELP);
    let res = console(&mut session, None).await;
    session.close().await;
    res
}

async fn console(session: &mut ChatSession, poller: Option<&UnreadPoller>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut badge = poller.map(UnreadPoller::subscribe);
    let mut draft = Draft::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if !handle(session, poller, &mut draft, Input::parse(&line)).await {
                    break;
                }
            }
            Some(event) = session.next_event() => {
                let id = event.message.id;
                if session.apply(event) {
                    if let Some(m) = session.messages().iter().rev().find(|m| m.id == id) {
                        println!("{}", ChatView::bubble(m, session.role(), session.attachment(id)));
                    }
                }
            }
            count = next_badge(&mut badge) => {
                if !session.is_visible() {
                    println!("{}", ChatView::badge(count));
                }
            }
        }
    }
    Ok(())
}

async fn next_badge(rx: &mut Option<watch::Receiver<u64>>) -> u64 {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    if rx.changed().await.is_err() {
        return std::future::pending().await;
    }
    *rx.borrow()
}

/// Returns `false` when the user asked to quit.
async fn handle(
    session: &mut ChatSession,
    poller: Option<&UnreadPoller>,
    draft: &mut Draft,
    input: Input,
) -> bool {
    let admin = session.role() == Role::Admin;
    match input {
        Input::Quit => return false,
        Input::Help => println!("{}", if admin { ADMIN_HELP } else { CUSTOMER_HELP }),
        Input::Invalid(msg) => println!("{}", msg),
        Input::Open => {
            if session.show().await {
                if let Some(p) = poller {
                    p.reset();
                }
            }
            println!("{}", ChatView::render(session));
        }
        Input::Close => {
            session.hide().await;
            let count = poller.map(UnreadPoller::count).unwrap_or(0);
            println!("Chat closed. {}", ChatView::badge(count));
        }
        Input::List if admin => println!("{}", refresh_list(session).await),
        Input::Select(id) if admin => {
            match session.select(id).await {
                Err(ChatError::NoConversation) => println!("No conversation #{}; try /list.", id),
                _ => println!("{}", ChatView::render(session)),
            }
        }
        Input::User(user_id) if admin => {
            let _ = session.open_for_user(user_id).await;
            println!("{}", ChatView::render(session));
        }
        Input::List | Input::Select(_) | Input::User(_) => println!("That command is for the admin console."),
        Input::Attach(path) => match read_attachment(&path).await {
            Ok(file) => {
                println!("Attached {} ({}).", file.file_name, file.content_type);
                draft.attachment = Some(file);
            }
            Err(e) => println!("Cannot attach {}: {}", path.display(), e),
        },
        Input::Download(id, path) => match session.load_attachment(id).await {
            AttachmentState::Ready(blob) => match tokio::fs::write(&path, &blob.bytes).await {
                Ok(()) => println!("Saved {} bytes to {}.", blob.bytes.len(), path.display()),
                Err(e) => println!("Cannot write {}: {}", path.display(), e),
            },
            AttachmentState::Failed(reason) => println!("#{}: {}", id, reason),
        },
        Input::Text(text) => {
            draft.text = text;
            match session.send(draft).await {
                Ok(()) => debug!("message handed to the backend"),
                Err(ChatError::NoConversation) if !admin => println!("Open the chat first (/open)."),
                Err(ChatError::NoConversation) => println!("Select a conversation first (/select or /user)."),
                Err(ChatError::EmptyMessage) => {}
                Err(_) => {
                    if let Some(notice) = session.notice() {
                        println!("! {}", notice);
                    }
                }
            }
        }
    }
    true
}

/// The admin sidebar after a fresh fetch. A failed fetch shows its notice above the last
/// known list.
async fn refresh_list(session: &mut ChatSession) -> String {
    let mut out = String::new();
    if session.refresh_conversations().await.is_err() {
        if let Some(notice) = session.notice() {
            out.push_str(&format!("! {}\n", notice));
        }
    }
    out.push_str(&Sidebar::render(session.conversations(), session.active_id()));
    out
}

async fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".into());
    Ok(Attachment::new(name, bytes))
}

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
use teloxide::dptree;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use teloxide::update_listeners::webhooks;
use teloxide::utils::command::BotCommands;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::configuration::Configuration;
use crate::db::{RepositoryProvider, StoreError};
use crate::feed_preferences::{SelectFeedError, chat_feed_code, select_feed};
use crate::sources::{Feed, MangaSuggestion, SourceRegistry, SubscribeError, SubscribeOutcome};
use crate::subscriptions::{NewSubscription, chat_subscriptions, remove_subscription};
use crate::utils::html_escape;

const NOTHING_FOUND: &str = "No Manga found with your criteria";
const MAX_SUGGESTIONS: usize = 20;

/// Last search results of a chat. Subscribe buttons refer to them by search id and index.
#[derive(Debug, Clone)]
struct PendingSearch {
    id: Uuid,
    feed: i64,
    suggestions: Vec<MangaSuggestion>,
}

pub struct BotState {
    pub repositories: RepositoryProvider,
    pub sources: Arc<SourceRegistry>,
    pending: Mutex<HashMap<i64, PendingSearch>>,
}

impl BotState {
    pub fn new(repositories: RepositoryProvider, sources: Arc<SourceRegistry>) -> Self {
        Self {
            repositories,
            sources,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
    pub html: bool,
}

impl Reply {
    fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: None, html: false }
    }
}

/// Payload carried by inline keyboard buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    SelectFeed(i64),
    Subscribe { search: Uuid, index: usize },
    Unsubscribe(Uuid),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let (kind, value) = data.split_once(':')?;
        match kind {
            "feed" => value.parse().ok().map(CallbackAction::SelectFeed),
            "sub" => {
                let (search, index) = value.split_once(':')?;
                Some(CallbackAction::Subscribe {
                    search: Uuid::parse_str(search).ok()?,
                    index: index.parse().ok()?,
                })
            }
            "unsub" => Uuid::parse_str(value).ok().map(CallbackAction::Unsubscribe),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            CallbackAction::SelectFeed(code) => format!("feed:{code}"),
            CallbackAction::Subscribe { search, index } => format!("sub:{}:{index}", search.simple()),
            CallbackAction::Unsubscribe(id) => format!("unsub:{id}"),
        }
    }
}

pub(crate) async fn handle_search(state: &BotState, chat_id: i64, title: &str) -> Result<Reply, String> {
    let title = title.trim();
    if title.is_empty() {
        return Err("No manga name supplied".to_string());
    }

    let code = chat_feed_code(state.repositories.feed_preferences().as_ref(), chat_id)
        .await
        .map_err(|e| format!("Failed to look up your feed: {e}"))?;

    let source = state
        .sources
        .get(code)
        .ok_or_else(|| "Your feed is not available right now, pick another one with /feed".to_string())?;

    let mut suggestions = match source.search(title).await {
        Ok(Some(suggestions)) if !suggestions.is_empty() => suggestions,
        Ok(_) => return Err(NOTHING_FOUND.to_string()),
        Err(e) => {
            log::warn!("Search for {title} on {} failed: {e}", source.feed().name());
            return Err(NOTHING_FOUND.to_string());
        }
    };
    suggestions.truncate(MAX_SUGGESTIONS);
    let search_id = Uuid::now_v7();

    let rows: Vec<Vec<InlineKeyboardButton>> = suggestions
        .iter()
        .enumerate()
        .filter_map(|(index, suggestion)| {
            let view_url = source.view_url(&suggestion.reference);
            let url = match reqwest::Url::parse(&view_url) {
                Ok(url) => url,
                Err(e) => {
                    log::debug!("Skipping suggestion with invalid URL {view_url}: {e}");
                    return None;
                }
            };
            Some(vec![
                InlineKeyboardButton::url(format!("{} 📖", suggestion.title), url),
                InlineKeyboardButton::callback(
                    "Subscribe 🔔",
                    CallbackAction::Subscribe { search: search_id, index }.encode(),
                ),
            ])
        })
        .collect();

    if rows.is_empty() {
        return Err(NOTHING_FOUND.to_string());
    }

    state
        .pending
        .lock()
        .await
        .insert(chat_id, PendingSearch { id: search_id, feed: code, suggestions });

    Ok(Reply {
        text: format!("These are the manga I found on {}:", source.feed().name()),
        keyboard: Some(InlineKeyboardMarkup::new(rows)),
        html: false,
    })
}

pub(crate) async fn handle_subscribe(
    state: &BotState,
    chat_id: i64,
    user_id: i64,
    user_name: &str,
    search_id: &Uuid,
    index: usize,
) -> Result<String, String> {
    let expired = || "That search has expired, please search again with /manga".to_string();

    let (feed, suggestion) = {
        let pending = state.pending.lock().await;
        // Buttons of an older results message carry a replaced search id.
        let search = pending
            .get(&chat_id)
            .filter(|search| search.id == *search_id)
            .ok_or_else(expired)?;
        let suggestion = search.suggestions.get(index).cloned().ok_or_else(expired)?;
        (search.feed, suggestion)
    };

    let source = state
        .sources
        .get(feed)
        .ok_or_else(|| "That feed is not available right now".to_string())?;

    let draft = NewSubscription {
        chat_id,
        user_id,
        user_name: user_name.to_string(),
        manga_name: suggestion.title.clone(),
        manga_url: source.view_url(&suggestion.reference),
    };

    let subscriptions = state.repositories.subscriptions();
    match source.subscribe(subscriptions.as_ref(), draft).await {
        Ok(SubscribeOutcome::Created(subscription)) => {
            Ok(format!("Successfully subscribed to {}", subscription.manga_name))
        }
        Ok(SubscribeOutcome::AlreadySubscribed) => {
            Ok(format!("You are already subscribed to {}", suggestion.title))
        }
        Err(SubscribeError::Validation(reason)) => Err(format!("Could not subscribe: {reason}")),
        Err(SubscribeError::Store(e)) => {
            log::error!("There was an error subscribing chat {chat_id}: {e}");
            Err("Could not save your subscription, please try again later".to_string())
        }
    }
}

pub(crate) async fn handle_feed_menu(state: &BotState, chat_id: i64) -> Result<Reply, String> {
    let current = chat_feed_code(state.repositories.feed_preferences().as_ref(), chat_id)
        .await
        .map_err(|e| format!("Failed to look up your feed: {e}"))?;

    let rows = state
        .sources
        .feeds()
        .into_iter()
        .map(|feed| {
            let label = if feed.code() == current {
                format!("{} ✅", feed.name())
            } else {
                feed.name().to_string()
            };
            vec![InlineKeyboardButton::callback(label, CallbackAction::SelectFeed(feed.code()).encode())]
        })
        .collect::<Vec<_>>();

    Ok(Reply {
        text: "Choose the website your searches should use:".to_string(),
        keyboard: Some(InlineKeyboardMarkup::new(rows)),
        html: false,
    })
}

pub(crate) async fn handle_select_feed(state: &BotState, chat_id: i64, code: i64) -> Result<String, String> {
    let feed = Feed::from_code(code)
        .filter(|_| state.sources.get(code).is_some())
        .ok_or_else(|| "That feed is not available".to_string())?;

    match select_feed(state.repositories.feed_preferences().as_ref(), chat_id, feed).await {
        Ok(_) => {
            state.pending.lock().await.remove(&chat_id);
            Ok(format!("Searches in this chat now use {}", feed.name()))
        }
        Err(SelectFeedError::MissingChat) => Err("No chat supplied for feed selection".to_string()),
        Err(SelectFeedError::Store(e)) => Err(format!("Failed to save your feed: {e}")),
    }
}

pub(crate) async fn handle_list(state: &BotState, chat_id: i64) -> Result<Reply, String> {
    let subscriptions = chat_subscriptions(state.repositories.subscriptions().as_ref(), chat_id)
        .await
        .map_err(|e| format!("Failed to list subscriptions: {e}"))?;

    if subscriptions.is_empty() {
        return Ok(Reply::plain("No subscriptions yet. Search with /manga <title>."));
    }

    let mut lines: Vec<String> = Vec::with_capacity(subscriptions.len());
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::with_capacity(subscriptions.len());
    for s in &subscriptions {
        let feed_name = Feed::from_code(s.manga_feed).map(Feed::name).unwrap_or("unknown feed");
        lines.push(format!(
            "- <a href=\"{}\">{}</a> ({})",
            html_escape(&s.manga_url),
            html_escape(&s.manga_name),
            feed_name
        ));
        rows.push(vec![InlineKeyboardButton::callback(
            format!("Remove {} ❌", s.manga_name),
            CallbackAction::Unsubscribe(s.id).encode(),
        )]);
    }

    Ok(Reply {
        text: format!("Your subscriptions:\n{}", lines.join("\n")),
        keyboard: Some(InlineKeyboardMarkup::new(rows)),
        html: true,
    })
}

pub(crate) async fn handle_unsubscribe(state: &BotState, chat_id: i64, id: &Uuid) -> Result<String, String> {
    let repository = state.repositories.subscriptions();
    let subscription = match repository.find_by_id(id).await {
        Ok(subscription) => subscription,
        Err(StoreError::NotFound) => return Ok("That subscription was already removed".to_string()),
        Err(e) => return Err(format!("Failed to look up subscription: {e}")),
    };

    if subscription.chat_id != chat_id {
        log::warn!("Chat {chat_id} tried to remove subscription {id} of chat {}", subscription.chat_id);
        return Err("That subscription belongs to another chat".to_string());
    }

    match remove_subscription(repository.as_ref(), id).await {
        Ok(()) => Ok(format!("Unsubscribed from {}", subscription.manga_name)),
        Err(StoreError::NotFound) => Ok("That subscription was already removed".to_string()),
        Err(e) => Err(format!("Failed to remove subscription: {e}")),
    }
}

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(description = "search a manga on your feed: /manga <title>")]
    Manga(String),
    #[command(description = "choose the manga website to search")]
    Feed,
    #[command(description = "list and remove your subscriptions")]
    Subscriptions,
    #[command(description = "display this help message")]
    Help,
    #[command(description = "display this help message")]
    Start,
}

pub async fn run(bot: Bot, state: Arc<BotState>, config: &Configuration) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::warn!("Failed to set Telegram bot commands: {}", e);
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(dptree::entry().filter_command::<Command>().endpoint(answer))
                .branch(dptree::endpoint(fallback)),
        )
        .branch(Update::filter_callback_query().endpoint(on_callback));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build();

    match &config.public_url {
        Some(public_url) => {
            let url = reqwest::Url::parse(public_url)?;
            let address = SocketAddr::from(([0, 0, 0, 0], config.port));
            log::info!("Listening for webhook updates on {address}, public URL {url}");

            let listener = webhooks::axum(bot, webhooks::Options::new(address, url)).await?;
            dispatcher
                .dispatch_with_listener(listener, LoggingErrorHandler::with_custom_text("An error from the update listener"))
                .await;
        }
        None => {
            log::info!("No public URL configured, using long polling");
            dispatcher.dispatch().await;
        }
    }

    Ok(())
}

async fn send_reply(bot: &Bot, chat_id: ChatId, reply: Reply) -> ResponseResult<()> {
    let mut request = bot.send_message(chat_id, reply.text);
    if reply.html {
        request = request.parse_mode(ParseMode::Html);
    }
    if let Some(keyboard) = reply.keyboard {
        request = request.reply_markup(keyboard);
    }
    request.await?;
    Ok(())
}

async fn answer(bot: Bot, msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    let result = match cmd {
        Command::Manga(title) => {
            log::info!("Chat {} searching for {title}", chat_id.0);
            handle_search(&state, chat_id.0, &title).await
        }
        Command::Feed => handle_feed_menu(&state, chat_id.0).await,
        Command::Subscriptions => handle_list(&state, chat_id.0).await,
        Command::Help | Command::Start => Ok(Reply::plain(Command::descriptions().to_string())),
    };

    match result {
        Ok(reply) => send_reply(&bot, chat_id, reply).await,
        Err(message) => send_reply(&bot, chat_id, Reply::plain(message)).await,
    }
}

async fn on_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    let chat_id = q.message.as_ref().map(|m| m.chat().id.0);
    let action = q.data.as_deref().and_then(CallbackAction::parse);

    let result = match (chat_id, action) {
        (Some(chat_id), Some(CallbackAction::Subscribe { search, index })) => {
            log::info!("Subscribing user {} in chat {chat_id}", q.from.id);
            handle_subscribe(&state, chat_id, q.from.id.0 as i64, &q.from.full_name(), &search, index).await
        }
        (Some(chat_id), Some(CallbackAction::SelectFeed(code))) => handle_select_feed(&state, chat_id, code).await,
        (Some(chat_id), Some(CallbackAction::Unsubscribe(id))) => handle_unsubscribe(&state, chat_id, &id).await,
        _ => {
            log::debug!("Ignoring callback with data {:?}", q.data);
            Err("This button is no longer valid".to_string())
        }
    };

    let text = match result {
        Ok(text) | Err(text) => text,
    };
    bot.answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(true)
        .await?;
    Ok(())
}

async fn fallback(bot: Bot, msg: Message) -> ResponseResult<()> {
    if let Some(text) = msg.text() {
        let reply = if text.starts_with('/') {
            Command::descriptions().to_string()
        } else {
            format!(
                "Send /manga <title> to look for a manga.\n\n{}",
                Command::descriptions()
            )
        };
        bot.send_message(msg.chat.id, reply).await?;
    }
    Ok(())
}

//! Conversation handling: registration, preference updates and questions.

use std::sync::Arc;

use teloxide::dispatching::dialogue::{self, InMemStorage};
use teloxide::dispatching::{MessageFilterExt, UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

use crate::api::{ApiClient, ApiReply};
use crate::split::{split_message, TELEGRAM_MAX_LEN};
use crate::texts;

type BotDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Where a chat is in the conversation
#[derive(Clone, Default, Debug, PartialEq)]
pub enum State {
    #[default]
    Idle,
    /// `/start` was accepted; the next text is the user's preferences
    RegisteringPrompt { username: String },
    /// `/set_prompt` was accepted; the next text replaces the preferences
    SettingPrompt { username: String },
}

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "register and describe your news preferences")]
    Start,
    #[command(description = "change your news preferences")]
    SetPrompt,
    #[command(description = "show this help")]
    Help,
}

pub fn new_storage() -> Arc<InMemStorage<State>> {
    InMemStorage::<State>::new()
}

/// Plain text that is not a bot command
fn is_plain_text(text: &str) -> bool {
    !text.trim_start().starts_with('/')
}

pub fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(start))
        .branch(case![Command::SetPrompt].endpoint(set_prompt_command))
        .branch(case![Command::Help].endpoint(help));

    let text_handler = Message::filter_text()
        .filter(|text: String| is_plain_text(&text))
        .branch(case![State::RegisteringPrompt { username }].endpoint(register_prompt))
        .branch(case![State::SettingPrompt { username }].endpoint(update_prompt))
        .branch(dptree::endpoint(predict_message));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(text_handler);

    dialogue::enter::<Update, InMemStorage<State>, State, _>().branch(message_handler)
}

/// Send `text`, split into Telegram-sized messages
pub async fn send_long(bot: &Bot, chat_id: ChatId, text: &str) -> HandlerResult {
    for chunk in split_message(text, TELEGRAM_MAX_LEN) {
        bot.send_message(chat_id, chunk).await?;
    }
    Ok(())
}

fn telegram_username(msg: &Message) -> Option<String> {
    msg.from
        .as_ref()
        .and_then(|u| u.username.clone())
        .filter(|u| !u.is_empty())
}

async fn start(bot: Bot, dialogue: BotDialogue, msg: Message) -> HandlerResult {
    let Some(username) = telegram_username(&msg) else {
        bot.send_message(msg.chat.id, texts::NO_USERNAME_REGISTER)
            .await?;
        dialogue.exit().await?;
        return Ok(());
    };

    bot.send_message(msg.chat.id, texts::START_TEXT).await?;
    dialogue.update(State::RegisteringPrompt { username }).await?;
    Ok(())
}

async fn register_prompt(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    text: String,
    username: String,
    api: Arc<ApiClient>,
) -> HandlerResult {
    let system_prompt = text.trim();
    let chat_id = msg.chat.id.0.to_string();

    let reply = match api.create_user(&username, &chat_id, system_prompt).await {
        Ok(ApiReply::Ok(_)) => {
            info!(%username, "user registered");
            texts::registered(system_prompt)
        }
        Ok(ApiReply::Rejected(message)) => format!("Could not create user: {message}"),
        Err(e) => {
            error!("Error calling /create_user: {}", e);
            texts::call_failed("create_user", &e)
        }
    };

    bot.send_message(msg.chat.id, reply).await?;
    dialogue.exit().await?;
    Ok(())
}

async fn set_prompt_command(bot: Bot, dialogue: BotDialogue, msg: Message) -> HandlerResult {
    let Some(username) = telegram_username(&msg) else {
        bot.send_message(msg.chat.id, texts::NO_USERNAME_ACTION)
            .await?;
        dialogue.exit().await?;
        return Ok(());
    };

    bot.send_message(msg.chat.id, texts::ASK_NEW_PROMPT).await?;
    dialogue.update(State::SettingPrompt { username }).await?;
    Ok(())
}

async fn update_prompt(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    text: String,
    username: String,
    api: Arc<ApiClient>,
) -> HandlerResult {
    let new_prompt = text.trim();
    info!("Updating prompt for user '{}' to '{}'", username, new_prompt);

    let reply = match api.set_prompt(&username, new_prompt).await {
        Ok(ApiReply::Ok(_)) => texts::prompt_updated(&username, new_prompt),
        Ok(ApiReply::Rejected(message)) => format!("Could not update prompt: {message}"),
        Err(e) => {
            error!("Error calling /set_prompt: {}", e);
            texts::call_failed("set_prompt", &e)
        }
    };

    bot.send_message(msg.chat.id, reply).await?;
    dialogue.exit().await?;
    Ok(())
}

async fn predict_message(
    bot: Bot,
    msg: Message,
    text: String,
    api: Arc<ApiClient>,
) -> HandlerResult {
    let Some(username) = telegram_username(&msg) else {
        bot.send_message(msg.chat.id, texts::NO_USERNAME_ACTION)
            .await?;
        return Ok(());
    };

    let result = api.predict(&username, &text).await;
    if let Err(e) = &result {
        error!("Error calling /predict: {}", e);
    }
    send_long(&bot, msg.chat.id, &texts::predict_reply(&result)).await
}

async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

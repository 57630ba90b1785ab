//! Telegram update dispatch.
//!
//! Translates raw updates into verifier events. Failures never reach the
//! member as raw errors: they are logged and answered with a generic notice.

use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::User;
use tracing::{debug, error, info};

use crate::verifier::{KeypadPress, LinkFollowed, MemberJoined, Verifier};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Argument of a `/start` deep-link command
#[derive(Debug, Clone)]
struct StartPayload(String);

/// Extract the payload from `/start <payload>` or `/start@bot <payload>`
pub fn start_payload(text: &str) -> Option<&str> {
    let mut parts = text.split_whitespace();
    let suffix = parts.next()?.strip_prefix("/start")?;
    if !(suffix.is_empty() || suffix.starts_with('@')) {
        return None;
    }
    parts.next()
}

/// Run long polling until Ctrl+C
pub async fn run(bot: Bot, verifier: Arc<Verifier>) {
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(
                    dptree::filter_map(|msg: Message| {
                        msg.new_chat_members().map(|members| members.to_vec())
                    })
                    .endpoint(on_new_members),
                )
                .branch(
                    dptree::filter_map(|msg: Message| {
                        if !msg.chat.is_private() {
                            return None;
                        }
                        msg.text()
                            .and_then(start_payload)
                            .map(|p| StartPayload(p.to_string()))
                    })
                    .endpoint(on_start),
                ),
        )
        .branch(Update::filter_callback_query().endpoint(on_callback));

    info!("Starting Telegram long polling");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![verifier])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn on_new_members(msg: Message, members: Vec<User>, verifier: Arc<Verifier>) -> HandlerResult {
    for member in members.into_iter().filter(|m| !m.is_bot) {
        let event = MemberJoined {
            chat_id: msg.chat.id.0,
            chat_title: msg.chat.title().map(String::from),
            chat_username: msg.chat.username().map(String::from),
            user_id: member.id.0,
            username: member.username.clone(),
            first_name: member.first_name.clone(),
        };

        if let Err(e) = verifier.on_member_joined(event).await {
            error!(chat_id = msg.chat.id.0, user_id = member.id.0, error = %e, "Failed to start verification");
        }
    }
    Ok(())
}

async fn on_start(msg: Message, payload: StartPayload, verifier: Arc<Verifier>) -> HandlerResult {
    let Some(actor) = msg.from.as_ref() else {
        return Ok(());
    };

    let event = LinkFollowed {
        payload: payload.0,
        actor_id: actor.id.0,
        private_chat_id: msg.chat.id.0,
    };

    match verifier.on_link_followed(event).await {
        Ok(outcome) => debug!(actor = actor.id.0, ?outcome, "Deep link handled"),
        Err(e) => {
            error!(actor = actor.id.0, error = %e, "Failed to issue challenge");
            let notice = &verifier.messages().try_later;
            if let Err(e) = verifier.platform().send_text(msg.chat.id.0, notice).await {
                debug!(error = %e, "Could not send failure notice");
            }
        }
    }
    Ok(())
}

async fn on_callback(query: CallbackQuery, verifier: Arc<Verifier>) -> HandlerResult {
    let callback_id = query.id.0.clone();
    let press = KeypadPress {
        callback_id: callback_id.clone(),
        actor_id: query.from.id.0,
        data: query.data.clone().unwrap_or_default(),
        message: query.message.as_ref().map(|m| (m.chat().id.0, m.id().0)),
    };

    match verifier.on_keypad(press).await {
        Ok(outcome) => debug!(actor = query.from.id.0, ?outcome, "Keypad press handled"),
        Err(e) => {
            error!(actor = query.from.id.0, error = %e, "Keypad press failed");
            let notice = &verifier.messages().try_later;
            if let Err(e) = verifier
                .platform()
                .answer_action(&callback_id, Some(notice), true)
                .await
            {
                debug!(error = %e, "Could not answer failed press");
            }
        }
    }
    Ok(())
}

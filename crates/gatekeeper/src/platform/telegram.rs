//! Telegram Bot API adapter.

use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, ChatPermissions, InlineKeyboardButton, InlineKeyboardMarkup, InputFile,
    InputMedia, InputMediaPhoto, MessageId, ParseMode,
};
use tracing::{debug, info};
use url::Url;

use gatekeeper_common::GatekeeperError;

use super::{Platform, PlatformResult};
use crate::keypad::Keypad;

const IMAGE_FILE_NAME: &str = "captcha.png";

pub struct TelegramPlatform {
    bot: Bot,
    /// Bot handle without `@`, used to build deep links
    username: String,
}

impl TelegramPlatform {
    /// Create the bot client and resolve its own username
    pub async fn connect(token: &str) -> PlatformResult<Self> {
        if token.is_empty() {
            return Err(GatekeeperError::Config("bot token cannot be empty".into()));
        }

        let bot = Bot::new(token);
        let me = bot.get_me().await.map_err(request_error)?;
        let username = me.username().to_string();
        info!(bot = %username, "Connected to Telegram");

        Ok(Self { bot, username })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

fn request_error(err: RequestError) -> GatekeeperError {
    match err {
        RequestError::Api(api) => GatekeeperError::PlatformRejected(api.to_string()),
        RequestError::Network(e) if e.is_timeout() => GatekeeperError::Timeout(e.to_string()),
        other => GatekeeperError::Platform(other.to_string()),
    }
}

/// Editing a message to identical content is reported as an error by the API
fn is_not_modified(err: &RequestError) -> bool {
    matches!(err, RequestError::Api(_)) && err.to_string().contains("message is not modified")
}

fn keyboard(keypad: &Keypad) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keypad.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.token.clone()))
            .collect::<Vec<_>>()
    }))
}

fn photo(image: &[u8]) -> InputFile {
    InputFile::memory(image.to_vec()).file_name(IMAGE_FILE_NAME)
}

#[async_trait]
impl Platform for TelegramPlatform {
    fn start_link(&self, payload: &str) -> String {
        format!("https://t.me/{}?start={payload}", self.username)
    }

    async fn send_prompt(
        &self,
        chat_id: i64,
        text: &str,
        button_label: &str,
        url: &str,
    ) -> PlatformResult<i32> {
        let url = Url::parse(url)
            .map_err(|e| GatekeeperError::Internal(format!("invalid deep link {url}: {e}")))?;
        let markup = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
            button_label.to_string(),
            url,
        )]]);

        let sent = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(markup)
            .await
            .map_err(request_error)?;

        Ok(sent.id.0)
    }

    async fn send_challenge(
        &self,
        chat_id: i64,
        image: &[u8],
        caption: &str,
        keypad: &Keypad,
    ) -> PlatformResult<i32> {
        let sent = self
            .bot
            .send_photo(ChatId(chat_id), photo(image))
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard(keypad))
            .await
            .map_err(request_error)?;

        Ok(sent.id.0)
    }

    async fn edit_challenge(
        &self,
        chat_id: i64,
        message_id: i32,
        image: Option<&[u8]>,
        caption: &str,
        keypad: &Keypad,
    ) -> PlatformResult<()> {
        let result = match image {
            Some(image) => {
                let media = InputMediaPhoto::new(photo(image))
                    .caption(caption)
                    .parse_mode(ParseMode::Html);
                self.bot
                    .edit_message_media(ChatId(chat_id), MessageId(message_id), InputMedia::Photo(media))
                    .reply_markup(keyboard(keypad))
                    .await
                    .map(|_| ())
            }
            None => self
                .bot
                .edit_message_caption(ChatId(chat_id), MessageId(message_id))
                .caption(caption)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard(keypad))
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => {
                debug!(chat_id, message_id, "Challenge message unchanged");
                Ok(())
            }
            Err(e) => Err(request_error(e)),
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> PlatformResult<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .map_err(request_error)?;
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> PlatformResult<i32> {
        let sent = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(request_error)?;
        Ok(sent.id.0)
    }

    async fn answer_action(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> PlatformResult<()> {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_owned()));
        if let Some(text) = text {
            request = request.text(text).show_alert(alert);
        }
        request.await.map_err(request_error)?;
        Ok(())
    }

    async fn restrict(&self, chat_id: i64, user_id: u64) -> PlatformResult<()> {
        self.bot
            .restrict_chat_member(ChatId(chat_id), UserId(user_id), ChatPermissions::empty())
            .await
            .map_err(request_error)?;
        Ok(())
    }

    async fn unrestrict(&self, chat_id: i64, user_id: u64) -> PlatformResult<()> {
        self.bot
            .restrict_chat_member(ChatId(chat_id), UserId(user_id), ChatPermissions::all())
            .await
            .map_err(request_error)?;
        Ok(())
    }

    async fn ban(&self, chat_id: i64, user_id: u64) -> PlatformResult<()> {
        self.bot
            .ban_chat_member(ChatId(chat_id), UserId(user_id))
            .await
            .map_err(request_error)?;
        Ok(())
    }

    async fn unban(&self, chat_id: i64, user_id: u64) -> PlatformResult<()> {
        self.bot
            .unban_chat_member(ChatId(chat_id), UserId(user_id))
            .await
            .map_err(request_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_common::{KeypadAction, Session, SessionKey};

    use crate::config::VerificationConfig;
    use crate::keypad;

    #[test]
    fn test_keyboard_mirrors_keypad_rows() {
        let key = SessionKey::new(-100, 5);
        let session = Session::awaiting_link("chat".into(), "user".into(), 1);
        let keypad = keypad::build(key, &session, "1234567890", &VerificationConfig::default());

        let markup = keyboard(&keypad);
        assert_eq!(markup.inline_keyboard.len(), keypad.rows.len());
        assert_eq!(markup.inline_keyboard[0].len(), keypad.rows[0].len());
        assert_eq!(markup.inline_keyboard[0][0].text, "1");

        let submit = keypad.button(KeypadAction::Submit).unwrap();
        let last_row = markup.inline_keyboard.last().unwrap();
        assert_eq!(last_row.last().unwrap().text, submit.label);
    }
}

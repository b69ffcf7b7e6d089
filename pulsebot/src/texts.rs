//! User-facing bot messages.

use crate::api::{ApiReply, ClientError};
use common::api::PredictData;

pub const START_TEXT: &str = "Hi! I am CryptoPulse, your crypto news assistant.\n\n\
Tell me what you care about (coins, sectors, events, the tone you like) and I will \
send you regular news digests shaped by it. You can also ask me anything about the \
latest crypto news at any time.\n\n\
Please describe your preferences in one message.";

/// Appended to the stored preferences for the periodic digest
pub const REGULAR_UPDATE_PROMPT: &str = "Give me a short digest of the most important \
crypto news matching my preferences above. Mention concrete assets and figures where \
the news provides them.";

pub const NO_USERNAME_REGISTER: &str =
    "You do not have a Telegram username set in your profile, so registration is not possible.";

pub const NO_USERNAME_ACTION: &str =
    "You do not have a Telegram username set in your profile. This action is not possible.";

pub const ASK_NEW_PROMPT: &str = "Please enter your new preferences.";

pub const NO_RESPONSE: &str = "No response";

pub fn registered(prompt: &str) -> String {
    format!(
        "I registered your preferences as '{prompt}' and will send you news updates soon. \
         You can change them with /set_prompt."
    )
}

pub fn prompt_updated(username: &str, new_prompt: &str) -> String {
    format!(
        "System prompt was updated successfully for user '{username}'. New prompt: '{new_prompt}'"
    )
}

pub fn call_failed(endpoint: &str, error: &ClientError) -> String {
    format!("Error calling /{endpoint}: {error}")
}

/// Reply for a user question sent through `/predict`
pub fn predict_reply(result: &Result<ApiReply<PredictData>, ClientError>) -> String {
    match result {
        Ok(ApiReply::Ok(data)) if data.response.trim().is_empty() => NO_RESPONSE.to_string(),
        Ok(ApiReply::Ok(data)) => data.response.clone(),
        Ok(ApiReply::Rejected(message)) => format!("Predict error: {message}"),
        Err(e) => call_failed("predict", e),
    }
}

/// Digest text for the periodic report; API rejections degrade to "No response"
pub fn report_reply(result: &Result<ApiReply<PredictData>, ClientError>) -> String {
    match result {
        Ok(ApiReply::Ok(data)) if !data.response.trim().is_empty() => data.response.clone(),
        Ok(_) => NO_RESPONSE.to_string(),
        Err(e) => call_failed("predict", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: &str) -> Result<ApiReply<PredictData>, ClientError> {
        Ok(ApiReply::Ok(PredictData {
            response: text.into(),
            sources: vec![],
        }))
    }

    #[test]
    fn predict_replies() {
        assert_eq!(predict_reply(&answer("BTC up")), "BTC up");
        assert_eq!(predict_reply(&answer("  ")), "No response");
        assert_eq!(
            predict_reply(&Ok(ApiReply::Rejected("User bob not found.".into()))),
            "Predict error: User bob not found."
        );
    }

    #[test]
    fn report_replies() {
        assert_eq!(report_reply(&answer("digest")), "digest");
        assert_eq!(
            report_reply(&Ok(ApiReply::Rejected("No matching documents found in the index.".into()))),
            "No response"
        );
        let err = ClientError::Decode("eof".into());
        assert_eq!(
            report_reply(&Err(err)),
            "Error calling /predict: unexpected response body: eof"
        );
    }

    #[test]
    fn confirmations() {
        assert_eq!(
            prompt_updated("alice", "layer 2"),
            "System prompt was updated successfully for user 'alice'. New prompt: 'layer 2'"
        );
        assert!(registered("defi").contains("'defi'"));
        assert!(registered("defi").ends_with("/set_prompt."));
    }
}

use serenity::builder::{CreateAttachment, CreateMessage};
use serenity::http::Http;
use serenity::model::channel::Message;

use crate::render::RenderedReply;

const TOO_MANY_REQUESTS: u16 = 429;

/// Reply to `msg` with text and attachments, referencing the original.
pub async fn send_reply(http: &Http, msg: &Message, reply: RenderedReply) -> serenity::Result<()> {
    let files = reply
        .attachments
        .into_iter()
        .map(|file| CreateAttachment::bytes(file.bytes, file.filename));

    let builder = CreateMessage::new()
        .content(reply.text)
        .reference_message(msg)
        .add_files(files);

    msg.channel_id.send_message(http, builder).await?;
    Ok(())
}

/// Whether Discord rejected the request with HTTP 429.
pub fn is_rate_limited(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(http_err) => http_err
            .status_code()
            .is_some_and(|status| status.as_u16() == TOO_MANY_REQUESTS),
        _ => false,
    }
}

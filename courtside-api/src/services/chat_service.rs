use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Attachment, Conversation, Message, NewAttachment, NewMessage, UserSummary};
use crate::schema::{attachments, conversation_participants, conversations, messages, users};
use crate::services::post_service::author_summaries;

#[derive(Debug, Serialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentInput {
    pub file_url: String,
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessage {
    pub conversation_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
    #[serde(default)]
    pub files: Vec<AttachmentInput>,
}

#[derive(Debug, Serialize)]
pub struct ContactInfo {
    pub id: Uuid,
    pub athlete_full_name: String,
    pub img_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LastMessage {
    pub id: Uuid,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub contact_info: Option<ContactInfo>,
    pub last_message: Option<LastMessage>,
}

/// Finds the conversation shared by both users, creating it if needed.
pub fn start_chat(conn: &mut PgConnection, user_id: Uuid, receiver_id: Uuid) -> AppResult<ConversationView> {
    if user_id == receiver_id {
        return Err(AppError::new(
            ErrorCode::CannotChatWithSelf,
            "You cannot start a conversation with yourself",
        ));
    }

    let receiver_exists: i64 = users::table
        .find(receiver_id)
        .filter(users::is_deleted.eq(false))
        .count()
        .get_result(conn)?;
    if receiver_exists == 0 {
        return Err(AppError::new(ErrorCode::UserNotFound, "User not found"));
    }

    let conversation = conn
        .build_transaction()
        .serializable()
        .run::<_, AppError, _>(|conn| {
            let cp_mine = diesel::alias!(conversation_participants as cp_mine);
            let mine = cp_mine
                .filter(cp_mine.field(conversation_participants::user_id).eq(user_id))
                .select(cp_mine.field(conversation_participants::conversation_id));

            let shared: Option<Conversation> = conversations::table
                .inner_join(conversation_participants::table)
                .filter(conversation_participants::user_id.eq(receiver_id))
                .filter(conversations::id.eq_any(mine))
                .select(Conversation::as_select())
                .first(conn)
                .optional()?;

            if let Some(existing) = shared {
                return Ok(existing);
            }

            let created: Conversation = diesel::insert_into(conversations::table)
                .default_values()
                .returning(Conversation::as_returning())
                .get_result(conn)?;

            diesel::insert_into(conversation_participants::table)
                .values(&vec![
                    (
                        conversation_participants::conversation_id.eq(created.id),
                        conversation_participants::user_id.eq(user_id),
                    ),
                    (
                        conversation_participants::conversation_id.eq(created.id),
                        conversation_participants::user_id.eq(receiver_id),
                    ),
                ])
                .execute(conn)?;

            tracing::info!(conversation_id = %created.id, user_id = %user_id, receiver_id = %receiver_id, "conversation created");
            Ok(created)
        })?;

    let participants = author_summaries(conn, &[user_id, receiver_id])?
        .into_values()
        .collect();
    Ok(ConversationView { conversation, participants })
}

fn normalize_content(content: Option<String>) -> Option<String> {
    content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn file_type_or_default(file_type: Option<String>) -> String {
    file_type
        .map(|t| t.trim().to_uppercase())
        .filter(|t| matches!(t.as_str(), "IMAGE" | "VIDEO" | "FILE"))
        .unwrap_or_else(|| "FILE".to_string())
}

fn both_participate(participants: &[Uuid], sender_id: Uuid, receiver_id: Uuid) -> bool {
    participants.contains(&sender_id) && participants.contains(&receiver_id)
}

pub fn save_message(conn: &mut PgConnection, sender_id: Uuid, input: SendMessage) -> AppResult<MessageView> {
    let content = normalize_content(input.content);
    if content.is_none() && input.files.is_empty() {
        return Err(AppError::new(ErrorCode::EmptyMessage, "Message must have content or files"));
    }

    let not_found = || AppError::new(ErrorCode::ConversationNotFound, "Conversation, Sender or Receiver not found");

    let participants: Vec<Uuid> = conversation_participants::table
        .filter(conversation_participants::conversation_id.eq(input.conversation_id))
        .select(conversation_participants::user_id)
        .load(conn)?;
    if !both_participate(&participants, sender_id, input.receiver_id) {
        return Err(not_found());
    }

    let view = conn.transaction::<_, AppError, _>(|conn| {
        let message: Message = diesel::insert_into(messages::table)
            .values(&NewMessage {
                id: Uuid::now_v7(),
                conversation_id: input.conversation_id,
                sender_id,
                receiver_id: input.receiver_id,
                content,
            })
            .returning(Message::as_returning())
            .get_result(conn)?;

        let rows: Vec<NewAttachment> = input
            .files
            .into_iter()
            .map(|f| NewAttachment {
                message_id: message.id,
                file_url: f.file_url,
                file_type: file_type_or_default(f.file_type),
            })
            .collect();
        let attachments: Vec<Attachment> = if rows.is_empty() {
            Vec::new()
        } else {
            diesel::insert_into(attachments::table)
                .values(&rows)
                .returning(Attachment::as_returning())
                .get_results(conn)?
        };

        Ok(MessageView { message, attachments })
    })?;

    if let Err(e) = diesel::update(conversations::table.find(input.conversation_id))
        .set(conversations::updated_at.eq(Utc::now()))
        .execute(conn)
    {
        tracing::warn!(conversation_id = %input.conversation_id, error = %e, "failed to bump conversation");
    }

    Ok(view)
}

fn attach_files(conn: &mut PgConnection, items: Vec<Message>) -> AppResult<Vec<MessageView>> {
    let ids: Vec<Uuid> = items.iter().map(|m| m.id).collect();
    let mut by_message: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
    for attachment in attachments::table
        .filter(attachments::message_id.eq_any(ids))
        .select(Attachment::as_select())
        .load(conn)?
    {
        by_message.entry(attachment.message_id).or_default().push(attachment);
    }

    Ok(items
        .into_iter()
        .map(|message| MessageView {
            attachments: by_message.remove(&message.id).unwrap_or_default(),
            message,
        })
        .collect())
}

/// Messages exchanged between two users, newest first.
pub fn history(conn: &mut PgConnection, user_id: Uuid, contact_id: Uuid, limit: i64, skip: i64) -> AppResult<Vec<MessageView>> {
    let items: Vec<Message> = messages::table
        .filter(
            messages::sender_id
                .eq(user_id)
                .and(messages::receiver_id.eq(contact_id))
                .or(messages::sender_id.eq(contact_id).and(messages::receiver_id.eq(user_id))),
        )
        .order(messages::created_at.desc())
        .offset(skip.max(0))
        .limit(limit.clamp(1, 200))
        .select(Message::as_select())
        .load(conn)?;

    attach_files(conn, items)
}

pub fn list_conversations(conn: &mut PgConnection, user_id: Uuid, limit: i64, skip: i64) -> AppResult<Vec<ConversationSummary>> {
    let mine = conversation_participants::table
        .filter(conversation_participants::user_id.eq(user_id))
        .select(conversation_participants::conversation_id);

    let convs: Vec<Conversation> = conversations::table
        .filter(conversations::id.eq_any(mine))
        .order(conversations::updated_at.desc())
        .offset(skip.max(0))
        .limit(limit.clamp(1, 100))
        .select(Conversation::as_select())
        .load(conn)?;

    let conv_ids: Vec<Uuid> = convs.iter().map(|c| c.id).collect();

    let others: Vec<(Uuid, Uuid)> = conversation_participants::table
        .filter(conversation_participants::conversation_id.eq_any(conv_ids.clone()))
        .filter(conversation_participants::user_id.ne(user_id))
        .select((conversation_participants::conversation_id, conversation_participants::user_id))
        .load(conn)?;
    let contact_of: HashMap<Uuid, Uuid> = others.into_iter().collect();

    let contact_ids: Vec<Uuid> = contact_of.values().copied().collect();
    let contacts = author_summaries(conn, &contact_ids)?;

    // newest first, so the first row seen per conversation is its last message
    let recent: Vec<Message> = messages::table
        .filter(messages::conversation_id.eq_any(conv_ids))
        .order(messages::created_at.desc())
        .select(Message::as_select())
        .load(conn)?;
    let mut last: HashMap<Uuid, LastMessage> = HashMap::new();
    for m in recent {
        last.entry(m.conversation_id).or_insert(LastMessage {
            id: m.id,
            content: m.content,
            created_at: m.created_at,
        });
    }

    Ok(convs
        .into_iter()
        .map(|c| ConversationSummary {
            conversation_id: c.id,
            contact_info: contact_of
                .get(&c.id)
                .and_then(|id| contacts.get(id))
                .map(|u| ContactInfo {
                    id: u.id,
                    athlete_full_name: u.athlete_full_name.clone(),
                    img_url: u.img_url.clone(),
                }),
            last_message: last.remove(&c.id),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_stay_inside_their_conversation() {
        let (alice, bob, mallory) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let participants = [alice, bob];

        assert!(both_participate(&participants, alice, bob));
        assert!(both_participate(&participants, bob, alice));
        assert!(!both_participate(&participants, alice, mallory));
        assert!(!both_participate(&participants, mallory, bob));
        assert!(!both_participate(&[], alice, bob));
    }

    #[test]
    fn content_is_trimmed_and_blank_dropped() {
        assert_eq!(normalize_content(Some("  hi  ".into())), Some("hi".into()));
        assert_eq!(normalize_content(Some("   ".into())), None);
        assert_eq!(normalize_content(None), None);
    }

    #[test]
    fn attachment_type_defaults_to_file() {
        assert_eq!(file_type_or_default(None), "FILE");
        assert_eq!(file_type_or_default(Some("image".into())), "IMAGE");
        assert_eq!(file_type_or_default(Some("gif".into())), "FILE");
    }

    #[test]
    fn send_payload_accepts_missing_files() {
        let input: SendMessage = serde_json::from_value(serde_json::json!({
            "conversation_id": Uuid::nil(),
            "receiver_id": Uuid::nil(),
            "content": "yo"
        }))
        .unwrap();
        assert!(input.files.is_empty());
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use convocore_core::types::{McpTransport, MessageRole};
use regex::RegexBuilder;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument, warn};

use crate::error::{Result, StorageError};
use crate::types::*;

/// Transactional reads/writes of every persisted entity. Wraps a single SQLite
/// connection behind a mutex — short critical sections only, never held
/// across a network suspension (no network I/O ever happens in this crate).
pub struct StorageGateway {
    conn: Mutex<Connection>,
}

impl StorageGateway {
    pub fn new(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    pub fn open(dsn: &str) -> Result<Self> {
        Ok(Self::new(crate::db::open(dsn)?))
    }

    /// One retry with a short backoff on a transient failure.
    /// Non-transient errors (not-found, conflict) return
    /// immediately without retrying.
    fn with_retry<T>(&self, mut op: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        match op(&conn) {
            Ok(v) => Ok(v),
            Err(StorageError::Unavailable(msg)) => {
                warn!(error = %msg, "storage op failed, retrying once");
                std::thread::sleep(std::time::Duration::from_millis(100));
                op(&conn)
            }
            Err(e) => Err(e),
        }
    }

    // ---------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------

    #[instrument(skip(self))]
    pub fn get_user(&self, id: &str) -> Result<User> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT id, name, password_hash, system_prompt, preferred_name,
                        default_model_url, summary_model, created_at, updated_at
                 FROM users WHERE id = ?1",
                params![id],
                map_user,
            )
            .map_err(Into::into)
        })
    }

    pub fn get_user_by_name(&self, name: &str) -> Result<User> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT id, name, password_hash, system_prompt, preferred_name,
                        default_model_url, summary_model, created_at, updated_at
                 FROM users WHERE name = ?1",
                params![name],
                map_user,
            )
            .map_err(Into::into)
        })
    }

    /// Whether any user exists yet — used at boot to decide whether the
    /// seeded administrator user still needs creating.
    pub fn any_user_exists(&self) -> Result<bool> {
        self.with_retry(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            Ok(count > 0)
        })
    }

    #[instrument(skip(self, password_hash))]
    pub fn create_user(
        &self,
        name: &str,
        password_hash: &str,
        system_prompt: &str,
    ) -> Result<User> {
        self.with_retry(|conn| {
            let id = convocore_core::types::UserId::new().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO users (id, name, password_hash, system_prompt, preferred_name,
                                     default_model_url, summary_model, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL, NULL, ?5, ?5)",
                params![id, name, password_hash, system_prompt, now],
            )?;
            debug!(user_id = %id, "created user");
            Ok(User {
                id,
                name: name.to_string(),
                password_hash: password_hash.to_string(),
                system_prompt: system_prompt.to_string(),
                preferred_name: None,
                default_model_url: None,
                summary_model: None,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    // ---------------------------------------------------------------
    // Agents
    // ---------------------------------------------------------------

    pub fn create_agent(
        &self,
        user_id: &str,
        name: &str,
        system_prompt: &str,
        model_name: &str,
        is_administrator: bool,
    ) -> Result<Agent> {
        self.with_retry(|conn| {
            let id = convocore_core::types::AgentId::new().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO agents (id, user_id, name, system_prompt, model_name,
                                     voice_reference, avatar, excluded_tools, think_mode,
                                     memory, trigger_word, is_administrator, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, '[]', 0, NULL, NULL, ?6, ?7, ?7)",
                params![id, user_id, name, system_prompt, model_name, is_administrator as i64, now],
            )?;
            Ok(Agent {
                id,
                user_id: user_id.to_string(),
                name: name.to_string(),
                system_prompt: system_prompt.to_string(),
                model_name: model_name.to_string(),
                voice_reference: None,
                avatar: None,
                excluded_tools: Vec::new(),
                think_mode: false,
                memory: None,
                trigger_word: None,
                is_administrator,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    pub fn get_agent(&self, id: &str) -> Result<Agent> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT id, user_id, name, system_prompt, model_name, voice_reference, avatar,
                        excluded_tools, think_mode, memory, trigger_word, is_administrator,
                        created_at, updated_at
                 FROM agents WHERE id = ?1",
                params![id],
                map_agent,
            )
            .map_err(Into::into)
        })
    }

    pub fn get_agent_by_name(&self, user_id: &str, name: &str) -> Result<Agent> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT id, user_id, name, system_prompt, model_name, voice_reference, avatar,
                        excluded_tools, think_mode, memory, trigger_word, is_administrator,
                        created_at, updated_at
                 FROM agents WHERE user_id = ?1 AND name = ?2",
                params![user_id, name],
                map_agent,
            )
            .map_err(Into::into)
        })
    }

    pub fn get_administrator(&self, user_id: &str) -> Result<Agent> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT id, user_id, name, system_prompt, model_name, voice_reference, avatar,
                        excluded_tools, think_mode, memory, trigger_word, is_administrator,
                        created_at, updated_at
                 FROM agents WHERE user_id = ?1 AND is_administrator = 1",
                params![user_id],
                map_agent,
            )
            .map_err(Into::into)
        })
    }

    pub fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, system_prompt, model_name, voice_reference, avatar,
                        excluded_tools, think_mode, memory, trigger_word, is_administrator,
                        created_at, updated_at
                 FROM agents WHERE user_id = ?1 ORDER BY name ASC",
            )?;
            let rows = stmt.query_map(params![user_id], map_agent)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Overwrite an agent's consolidated memory. Truncated to
    /// the ≤4,000 character cap by the caller before this is invoked.
    pub fn update_agent_memory(&self, agent_id: &str, memory: &str) -> Result<()> {
        self.with_retry(|conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "UPDATE agents SET memory = ?1, updated_at = ?2 WHERE id = ?3",
                params![memory, now, agent_id],
            )?;
            if changed == 0 {
                return Err(StorageError::NotFound(format!("agent {agent_id}")));
            }
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Conversations
    // ---------------------------------------------------------------

    pub fn create_conversation(&self, user_id: &str, title: &str) -> Result<Conversation> {
        self.with_retry(|conn| {
            let id = convocore_core::types::ConversationId::new().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id, user_id, title, now],
            )?;
            Ok(Conversation {
                id,
                user_id: user_id.to_string(),
                title: title.to_string(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Conversation> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT id, user_id, title, created_at, updated_at FROM conversations WHERE id = ?1",
                params![id],
                map_conversation,
            )
            .map_err(Into::into)
        })
    }

    pub fn list_conversations(&self, user_id: &str, limit: u32) -> Result<Vec<Conversation>> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, created_at, updated_at FROM conversations
                 WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user_id, limit], map_conversation)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Messages newest-first then reversed for chronological return
    /// (enables infinite scroll backwards).
    pub fn get_conversation_with_messages(
        &self,
        id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Conversation, Vec<Message>)> {
        self.with_retry(|conn| {
            let conversation = conn
                .query_row(
                    "SELECT id, user_id, title, created_at, updated_at FROM conversations WHERE id = ?1",
                    params![id],
                    map_conversation,
                )
                .map_err(StorageError::from)?;

            let mut stmt = conn.prepare(
                "SELECT m.id, m.frame_id, m.agent_id, m.role, m.content, m.thinking,
                        m.raw_input, m.raw_output, m.speaker_name, m.created_at
                 FROM messages m
                 JOIN frames f ON f.id = m.frame_id
                 WHERE f.conversation_id = ?1
                 ORDER BY m.created_at DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![id, limit, offset], map_message)?;
            let mut messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            messages.reverse();
            Ok((conversation, messages))
        })
    }

    /// Delete the given message and every later message in the same
    /// conversation (by `created_at`), implementing delete-to-branch.
    pub fn delete_messages_from(&self, message_id: &str) -> Result<()> {
        self.with_retry(|conn| {
            let (conversation_id, created_at): (String, String) = conn
                .query_row(
                    "SELECT f.conversation_id, m.created_at
                     FROM messages m JOIN frames f ON f.id = m.frame_id
                     WHERE m.id = ?1",
                    params![message_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(StorageError::from)?;

            conn.execute(
                "DELETE FROM messages WHERE created_at >= ?1 AND frame_id IN
                    (SELECT id FROM frames WHERE conversation_id = ?2)",
                params![created_at, conversation_id],
            )?;
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Frames
    // ---------------------------------------------------------------

    /// Returns the conversation's current frame, opening a new one if (a)
    /// none exists yet or (b) the existing one's newest message predates
    /// `idle_threshold_minutes`. Atomic under the gateway's single-connection
    /// mutex — no other writer can interleave.
    #[instrument(skip(self))]
    pub fn open_or_get_current_frame(
        &self,
        conversation_id: &str,
        idle_threshold_minutes: i64,
    ) -> Result<(Frame, bool)> {
        self.with_retry(|conn| {
            let existing: Option<(String, Option<String>, String, String)> = conn
                .query_row(
                    "SELECT id, summary, created_at, updated_at FROM frames
                     WHERE conversation_id = ?1 ORDER BY created_at DESC LIMIT 1",
                    params![conversation_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;

            let needs_new = match &existing {
                None => true,
                Some((frame_id, _, _, _)) => {
                    let newest_message_at: Option<String> = conn
                        .query_row(
                            "SELECT MAX(created_at) FROM messages WHERE frame_id = ?1",
                            params![frame_id],
                            |r| r.get(0),
                        )
                        .optional()?
                        .flatten();
                    match newest_message_at {
                        None => false,
                        Some(ts) => {
                            let last = DateTime::parse_from_rfc3339(&ts)
                                .map(|d| d.with_timezone(&Utc))
                                .unwrap_or_else(|_| Utc::now());
                            Utc::now() - last > Duration::minutes(idle_threshold_minutes)
                        }
                    }
                }
            };

            if !needs_new {
                let (id, summary, created_at, updated_at) = existing.unwrap();
                return Ok((
                    Frame { id, conversation_id: conversation_id.to_string(), summary, created_at, updated_at },
                    false,
                ));
            }

            let id = convocore_core::types::FrameId::new().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO frames (id, conversation_id, summary, created_at, updated_at)
                 VALUES (?1, ?2, NULL, ?3, ?3)",
                params![id, conversation_id, now],
            )?;
            let rolled_over = existing.is_some();
            Ok((
                Frame { id, conversation_id: conversation_id.to_string(), summary: None, created_at: now.clone(), updated_at: now },
                rolled_over,
            ))
        })
    }

    pub fn get_frame(&self, id: &str) -> Result<Frame> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT id, conversation_id, summary, created_at, updated_at FROM frames WHERE id = ?1",
                params![id],
                map_frame,
            )
            .map_err(Into::into)
        })
    }

    pub fn list_frames(&self, conversation_id: &str) -> Result<Vec<Frame>> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, summary, created_at, updated_at FROM frames
                 WHERE conversation_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id], map_frame)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn set_frame_summary(&self, frame_id: &str, summary: &str) -> Result<()> {
        self.with_retry(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE frames SET summary = ?1, updated_at = ?2 WHERE id = ?3",
                params![summary, now, frame_id],
            )?;
            Ok(())
        })
    }

    pub fn get_frame_messages(&self, frame_id: &str) -> Result<Vec<Message>> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, frame_id, agent_id, role, content, thinking, raw_input, raw_output,
                        speaker_name, created_at
                 FROM messages WHERE frame_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![frame_id], map_message)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    // ---------------------------------------------------------------
    // Messages
    // ---------------------------------------------------------------

    pub fn append_message(&self, frame_id: &str, new_message: NewMessage) -> Result<Message> {
        self.with_retry(|conn| {
            let id = convocore_core::types::MessageId::new().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO messages (id, frame_id, agent_id, role, content, thinking,
                                       raw_input, raw_output, speaker_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    frame_id,
                    new_message.agent_id,
                    new_message.role.to_string(),
                    new_message.content,
                    new_message.thinking,
                    new_message.raw_input,
                    new_message.raw_output,
                    new_message.speaker_name,
                    now,
                ],
            )?;
            Ok(Message {
                id,
                frame_id: frame_id.to_string(),
                agent_id: new_message.agent_id,
                role: new_message.role,
                content: new_message.content,
                thinking: new_message.thinking,
                raw_input: new_message.raw_input,
                raw_output: new_message.raw_output,
                speaker_name: new_message.speaker_name,
                created_at: now,
            })
        })
    }

    /// Incremental durability: if the newest message in the frame has the
    /// same role and agent as this chunk, append to its content and thinking
    /// and replace its raw I/O; otherwise start a new row. `raw_input`/
    /// `raw_output` carry the latest round's serialized LLM request/response
    /// (including any tool_calls) rather than accumulating across rounds.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, content_chunk, thinking_chunk, raw_input, raw_output))]
    pub fn upsert_streaming_message(
        &self,
        frame_id: &str,
        role: MessageRole,
        agent_id: Option<&str>,
        content_chunk: &str,
        thinking_chunk: Option<&str>,
        raw_input: Option<&str>,
        raw_output: Option<&str>,
    ) -> Result<Message> {
        self.with_retry(|conn| {
            let newest: Option<(String, String, Option<String>, String, Option<String>)> = conn
                .query_row(
                    "SELECT id, role, agent_id, content, thinking FROM messages
                     WHERE frame_id = ?1 ORDER BY created_at DESC LIMIT 1",
                    params![frame_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                )
                .optional()?;

            let role_str = role.to_string();
            let same_boundary = matches!(
                &newest,
                Some((_, r, a, _, _)) if r == &role_str && a.as_deref() == agent_id
            );

            if same_boundary {
                let (id, _, _, old_content, old_thinking) = newest.unwrap();
                let new_content = format!("{old_content}{content_chunk}");
                let new_thinking = match (old_thinking, thinking_chunk) {
                    (Some(old), Some(new)) => Some(format!("{old}{new}")),
                    (Some(old), None) => Some(old),
                    (None, Some(new)) => Some(new.to_string()),
                    (None, None) => None,
                };
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "UPDATE messages SET content = ?1, thinking = ?2, raw_input = ?3, raw_output = ?4 WHERE id = ?5",
                    params![new_content, new_thinking, raw_input, raw_output, id],
                )?;
                Ok(Message {
                    id,
                    frame_id: frame_id.to_string(),
                    agent_id: agent_id.map(str::to_string),
                    role,
                    content: new_content,
                    thinking: new_thinking,
                    raw_input: raw_input.map(str::to_string),
                    raw_output: raw_output.map(str::to_string),
                    speaker_name: None,
                    created_at: now,
                })
            } else {
                let id = convocore_core::types::MessageId::new().to_string();
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "INSERT INTO messages (id, frame_id, agent_id, role, content, thinking,
                                           raw_input, raw_output, speaker_name, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)",
                    params![id, frame_id, agent_id, role_str, content_chunk, thinking_chunk, raw_input, raw_output, now],
                )?;
                Ok(Message {
                    id,
                    frame_id: frame_id.to_string(),
                    agent_id: agent_id.map(str::to_string),
                    role,
                    content: content_chunk.to_string(),
                    thinking: thinking_chunk.map(str::to_string),
                    raw_input: raw_input.map(str::to_string),
                    raw_output: raw_output.map(str::to_string),
                    speaker_name: None,
                    created_at: now,
                })
            }
        })
    }

    // ---------------------------------------------------------------
    // Skills
    // ---------------------------------------------------------------

    pub fn create_skill(&self, user_id: &str, name: &str, instructions: &str) -> Result<Skill> {
        self.with_retry(|conn| {
            let id = convocore_core::types::SkillId::new().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO skills (id, user_id, name, instructions, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, user_id, name, instructions, now],
            )?;
            Ok(Skill { id, user_id: user_id.to_string(), name: name.to_string(), instructions: instructions.to_string(), created_at: now.clone(), updated_at: now })
        })
    }

    pub fn list_skills(&self, user_id: &str) -> Result<Vec<Skill>> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, instructions, created_at, updated_at FROM skills
                 WHERE user_id = ?1 ORDER BY name ASC",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok(Skill {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    instructions: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn get_skill_by_name(&self, user_id: &str, name: &str) -> Result<Skill> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT id, user_id, name, instructions, created_at, updated_at FROM skills
                 WHERE user_id = ?1 AND name = ?2",
                params![user_id, name],
                |row| {
                    Ok(Skill {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        instructions: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .map_err(Into::into)
        })
    }

    // ---------------------------------------------------------------
    // MCP servers
    // ---------------------------------------------------------------

    pub fn create_mcp_server(
        &self,
        user_id: &str,
        name: &str,
        transport: McpTransport,
        url: Option<&str>,
        command: Option<&str>,
        args: &[String],
    ) -> Result<McpServer> {
        self.with_retry(|conn| {
            let id = convocore_core::types::McpServerId::new().to_string();
            let transport_str = match transport {
                McpTransport::Sse => "sse",
                McpTransport::Stdio => "stdio",
            };
            let args_json = serde_json::to_string(args)?;
            conn.execute(
                "INSERT INTO mcp_servers (id, user_id, name, transport, url, command, args, env, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '{}', 1)",
                params![id, user_id, name, transport_str, url, command, args_json],
            )?;
            Ok(McpServer {
                id,
                user_id: user_id.to_string(),
                name: name.to_string(),
                transport,
                url: url.map(str::to_string),
                command: command.map(str::to_string),
                args: args.to_vec(),
                env: HashMap::new(),
                enabled: true,
            })
        })
    }

    pub fn list_mcp_servers(&self, user_id: &str) -> Result<Vec<McpServer>> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, transport, url, command, args, env, enabled
                 FROM mcp_servers WHERE user_id = ?1 AND enabled = 1 ORDER BY name ASC",
            )?;
            let rows = stmt.query_map(params![user_id], map_mcp_server)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    // ---------------------------------------------------------------
    // Face identities / photos
    // ---------------------------------------------------------------

    pub fn create_face_identity(&self, user_id: &str, name: &str) -> Result<FaceIdentity> {
        self.with_retry(|conn| {
            let id = convocore_core::types::FaceIdentityId::new().to_string();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO face_identities (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, user_id, name, now],
            )?;
            Ok(FaceIdentity { id, user_id: user_id.to_string(), name: name.to_string(), created_at: now })
        })
    }

    pub fn add_face_photo(&self, identity_id: &str, embedding: &[f32], photo_blob_uuid: &str) -> Result<FacePhoto> {
        self.with_retry(|conn| {
            let id = convocore_core::types::FacePhotoId::new().to_string();
            let now = Utc::now().to_rfc3339();
            let embedding_json = serde_json::to_string(embedding)?;
            conn.execute(
                "INSERT INTO face_photos (id, identity_id, embedding, photo_blob_uuid, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, identity_id, embedding_json, photo_blob_uuid, now],
            )?;
            Ok(FacePhoto { id, identity_id: identity_id.to_string(), embedding: embedding.to_vec(), photo_blob_uuid: photo_blob_uuid.to_string(), created_at: now })
        })
    }

    /// All embeddings for a user, loaded fresh on every call — callers that
    /// need a hot-path snapshot cache this themselves and invalidate on
    /// face CRUD.
    pub fn list_face_embeddings(&self, user_id: &str) -> Result<Vec<(FaceIdentity, Vec<FacePhoto>)>> {
        self.with_retry(|conn| {
            let mut id_stmt = conn.prepare(
                "SELECT id, user_id, name, created_at FROM face_identities WHERE user_id = ?1",
            )?;
            let identities = id_stmt
                .query_map(params![user_id], |row| {
                    Ok(FaceIdentity {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut out = Vec::with_capacity(identities.len());
            for identity in identities {
                let mut photo_stmt = conn.prepare(
                    "SELECT id, identity_id, embedding, photo_blob_uuid, created_at
                     FROM face_photos WHERE identity_id = ?1",
                )?;
                let photos = photo_stmt
                    .query_map(params![identity.id], map_face_photo)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                out.push((identity, photos));
            }
            Ok(out)
        })
    }

    pub fn delete_face_identity(&self, identity_id: &str) -> Result<()> {
        self.with_retry(|conn| {
            conn.execute("DELETE FROM face_identities WHERE id = ?1", params![identity_id])?;
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Built-in tool support
    // ---------------------------------------------------------------

    pub fn conversation_info(&self, conversation_id: &str) -> Result<ConversationInfo> {
        self.with_retry(|conn| {
            let (count, first, last): (i64, Option<String>, Option<String>) = conn.query_row(
                "SELECT COUNT(*), MIN(m.created_at), MAX(m.created_at)
                 FROM messages m JOIN frames f ON f.id = m.frame_id
                 WHERE f.conversation_id = ?1",
                params![conversation_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(ConversationInfo { message_count: count as u64, first_message_at: first, last_message_at: last })
        })
    }

    /// Regex search within the active conversation — a literal pattern match,
    /// not a full-text match, over stored content.
    pub fn search_messages(
        &self,
        conversation_id: &str,
        pattern: &str,
        case_sensitive: bool,
        date_from: Option<&str>,
        date_to: Option<&str>,
        limit: u32,
    ) -> Result<Vec<MessageSearchHit>> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| StorageError::Conflict(format!("invalid pattern: {e}")))?;

        self.with_retry(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.frame_id, m.content, m.created_at
                 FROM messages m JOIN frames f ON f.id = m.frame_id
                 WHERE f.conversation_id = ?1
                 ORDER BY m.created_at ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
            })?;

            let mut hits = Vec::new();
            for row in rows {
                let (message_id, frame_id, content, created_at) = row?;
                if let Some(from) = date_from {
                    if created_at.as_str() < from {
                        continue;
                    }
                }
                if let Some(to) = date_to {
                    if created_at.as_str() > to {
                        continue;
                    }
                }
                if let Some(m) = regex.find(&content) {
                    let start = m.start().saturating_sub(40);
                    let end = (m.end() + 40).min(content.len());
                    let snippet = content[start..end].to_string();
                    hits.push(MessageSearchHit { message_id, frame_id, snippet, created_at });
                    if hits.len() as u32 >= limit {
                        break;
                    }
                }
            }
            Ok(hits)
        })
    }
}

fn map_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        password_hash: row.get(2)?,
        system_prompt: row.get(3)?,
        preferred_name: row.get(4)?,
        default_model_url: row.get(5)?,
        summary_model: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_agent(row: &rusqlite::Row) -> rusqlite::Result<Agent> {
    let excluded_tools_json: String = row.get(7)?;
    let excluded_tools: Vec<String> = serde_json::from_str(&excluded_tools_json).unwrap_or_default();
    Ok(Agent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        system_prompt: row.get(3)?,
        model_name: row.get(4)?,
        voice_reference: row.get(5)?,
        avatar: row.get(6)?,
        excluded_tools,
        think_mode: row.get::<_, i64>(8)? != 0,
        memory: row.get(9)?,
        trigger_word: row.get(10)?,
        is_administrator: row.get::<_, i64>(11)? != 0,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn map_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_frame(row: &rusqlite::Row) -> rusqlite::Result<Frame> {
    Ok(Frame {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        summary: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role_str: String = row.get(3)?;
    let role: MessageRole = role_str.parse().unwrap_or(MessageRole::User);
    Ok(Message {
        id: row.get(0)?,
        frame_id: row.get(1)?,
        agent_id: row.get(2)?,
        role,
        content: row.get(4)?,
        thinking: row.get(5)?,
        raw_input: row.get(6)?,
        raw_output: row.get(7)?,
        speaker_name: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn map_mcp_server(row: &rusqlite::Row) -> rusqlite::Result<McpServer> {
    let transport_str: String = row.get(3)?;
    let transport = match transport_str.as_str() {
        "stdio" => McpTransport::Stdio,
        _ => McpTransport::Sse,
    };
    let args_json: String = row.get(6)?;
    let env_json: String = row.get(7)?;
    Ok(McpServer {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        transport,
        url: row.get(4)?,
        command: row.get(5)?,
        args: serde_json::from_str(&args_json).unwrap_or_default(),
        env: serde_json::from_str(&env_json).unwrap_or_default(),
        enabled: row.get::<_, i64>(8)? != 0,
    })
}

fn map_face_photo(row: &rusqlite::Row) -> rusqlite::Result<FacePhoto> {
    let embedding_json: String = row.get(2)?;
    Ok(FacePhoto {
        id: row.get(0)?,
        identity_id: row.get(1)?,
        embedding: serde_json::from_str(&embedding_json).unwrap_or_default(),
        photo_blob_uuid: row.get(3)?,
        created_at: row.get(4)?,
    })
}

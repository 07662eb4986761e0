use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};
use wabridge_core::{now_millis, AccountId, ChatId, Label};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{
    ChatPolicyDoc, Hints, Modality, PolicyMode, SessionPolicyDoc, SessionRecord, Turn, TurnMeta,
    TurnStatus,
};

/// The sole persistence surface for the bridge: a SQLite database guarded by
/// a single mutex, serializing access to the connection rather than pooling
/// it.
pub struct Store {
    conn: Mutex<rusqlite::Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = rusqlite::Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // -- accounts / membership --------------------------------------------

    pub fn ensure_account(&self, account_id: &str, ws_server: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO accounts (account_id, ws_server) VALUES (?1, ?2)",
            params![account_id, ws_server],
        )?;
        Ok(())
    }

    pub fn set_member_role(&self, account_id: &str, uid: &str, role: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO members (account_id, uid, role) VALUES (?1, ?2, ?3)
             ON CONFLICT(account_id, uid) DO UPDATE SET role = excluded.role",
            params![account_id, uid, role],
        )?;
        Ok(())
    }

    pub fn member_role(&self, account_id: &str, uid: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let role = conn
            .query_row(
                "SELECT role FROM members WHERE account_id = ?1 AND uid = ?2",
                params![account_id, uid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(role)
    }

    pub fn set_acl_labels(&self, account_id: &str, uid: &str, labels: &[String]) -> Result<()> {
        let encoded = serde_json::to_string(labels)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO acl (account_id, uid, labels) VALUES (?1, ?2, ?3)
             ON CONFLICT(account_id, uid) DO UPDATE SET labels = excluded.labels",
            params![account_id, uid, encoded],
        )?;
        Ok(())
    }

    pub fn acl_labels(&self, account_id: &str, uid: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT labels FROM acl WHERE account_id = ?1 AND uid = ?2",
                params![account_id, uid],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    // -- sessions -----------------------------------------------------------

    /// Creates the session row if absent. Mirrors `SessionManager::get_or_create`'s
    /// insert-then-readback dance so two callers racing on the same key never
    /// both succeed at creating a divergent row.
    pub fn get_or_create_session(&self, account_id: &str, label: &str) -> Result<SessionRecord> {
        let conn = self.conn.lock().unwrap();
        let created_at = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO sessions (account_id, label, status, created_at)
             VALUES (?1, ?2, 'starting', ?3)",
            params![account_id, label, created_at],
        )?;
        drop(conn);
        self.session(account_id, label)?
            .ok_or_else(|| StoreError::SessionNotFound {
                account_id: account_id.to_string(),
                label: label.to_string(),
            })
    }

    pub fn session(&self, account_id: &str, label: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT account_id, label, wa_id, status, created_at, last_ready_at,
                        bot_enabled, receive_from_bots, mode, allowlist, blocklist
                 FROM sessions WHERE account_id = ?1 AND label = ?2",
                params![account_id, label],
                map_session_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_sessions(&self, account_id: &str) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT account_id, label, wa_id, status, created_at, last_ready_at,
                    bot_enabled, receive_from_bots, mode, allowlist, blocklist
             FROM sessions WHERE account_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![account_id], map_session_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_session_status(&self, account_id: &str, label: &str, status: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET status = ?1 WHERE account_id = ?2 AND label = ?3",
            params![status, account_id, label],
        )?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound {
                account_id: account_id.to_string(),
                label: label.to_string(),
            });
        }
        Ok(())
    }

    pub fn mark_session_ready(&self, account_id: &str, label: &str, wa_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE sessions SET status = 'ready', wa_id = ?1, last_ready_at = ?2
             WHERE account_id = ?3 AND label = ?4",
            params![wa_id, now, account_id, label],
        )?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound {
                account_id: account_id.to_string(),
                label: label.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_session_policy(
        &self,
        account_id: &str,
        label: &str,
        policy: &SessionPolicyDoc,
    ) -> Result<()> {
        let allowlist = serde_json::to_string(&policy.allowlist)?;
        let blocklist = serde_json::to_string(&policy.blocklist)?;
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET bot_enabled = ?1, receive_from_bots = ?2, mode = ?3,
                    allowlist = ?4, blocklist = ?5
             WHERE account_id = ?6 AND label = ?7",
            params![
                policy.enabled as i64,
                policy.receive_from_bots as i64,
                policy.mode.to_string(),
                allowlist,
                blocklist,
                account_id,
                label
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound {
                account_id: account_id.to_string(),
                label: label.to_string(),
            });
        }
        Ok(())
    }

    // -- thread (chat) settings ----------------------------------------------

    pub fn chat_policy(
        &self,
        account_id: &str,
        label: &str,
        chat_id: &ChatId,
    ) -> Result<ChatPolicyDoc> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT bot_enabled, preferred_modality FROM thread_settings
                 WHERE account_id = ?1 AND label = ?2 AND chat_id = ?3",
                params![account_id, label, chat_id.as_str()],
                |row| {
                    let bot_enabled: Option<i64> = row.get(0)?;
                    let modality: Option<String> = row.get(1)?;
                    Ok((bot_enabled, modality))
                },
            )
            .optional()?;
        Ok(match row {
            Some((bot_enabled, modality)) => ChatPolicyDoc {
                bot_enabled: bot_enabled.map(|v| v != 0),
                preferred_modality: modality.and_then(|m| match m.as_str() {
                    "text" => Some(Modality::Text),
                    "voice" => Some(Modality::Voice),
                    _ => None,
                }),
            },
            None => ChatPolicyDoc::default(),
        })
    }

    pub fn set_chat_policy(
        &self,
        account_id: &str,
        label: &str,
        chat_id: &ChatId,
        policy: &ChatPolicyDoc,
    ) -> Result<()> {
        let modality = policy.preferred_modality.map(|m| match m {
            Modality::Text => "text",
            Modality::Voice => "voice",
        });
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO thread_settings (account_id, label, chat_id, bot_enabled, preferred_modality)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(account_id, label, chat_id) DO UPDATE SET
                bot_enabled = excluded.bot_enabled,
                preferred_modality = excluded.preferred_modality",
            params![
                account_id,
                label,
                chat_id.as_str(),
                policy.bot_enabled.map(|v| v as i64),
                modality
            ],
        )?;
        Ok(())
    }

    // -- turns ----------------------------------------------------------------

    /// `opened_at` is the caller's authoritative window-open timestamp (the
    /// coerced ts of the first item buffered), not `now()` — it must match
    /// the `openedAt` baked into `window_id`.
    pub fn open_turn(
        &self,
        account_id: &AccountId,
        label: &Label,
        chat_id: &ChatId,
        window_id: &str,
        opened_at: i64,
        hints: &Hints,
    ) -> Result<()> {
        let hints_json = serde_json::to_string(hints)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO turns (window_id, account_id, label, chat_id, status, opened_at,
                                 closed_at, hints, items)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, 0, ?6, '[]')",
            params![window_id, account_id, label, chat_id.as_str(), opened_at, hints_json],
        )?;
        Ok(())
    }

    pub fn append_turn_item(&self, window_id: &str, item_json: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let current: String = conn.query_row(
            "SELECT items FROM turns WHERE window_id = ?1",
            params![window_id],
            |row| row.get(0),
        )?;
        let mut items: Vec<serde_json::Value> = serde_json::from_str(&current)?;
        items.push(serde_json::from_str(item_json)?);
        let encoded = serde_json::to_string(&items)?;
        conn.execute(
            "UPDATE turns SET items = ?1 WHERE window_id = ?2",
            params![encoded, window_id],
        )?;
        Ok(())
    }

    /// Moves a `pending` turn to `ready`, replacing `items` with the
    /// assembler's sorted/merged list and sealing `closed_at` at the last
    /// item's ts (not `now()`). Called by the buffer manager at flush time.
    pub fn close_turn_ready(
        &self,
        window_id: &str,
        items: &[crate::types::TurnItem],
        closed_at: i64,
        hints: &Hints,
    ) -> Result<()> {
        let items_json = serde_json::to_string(items)?;
        let hints_json = serde_json::to_string(hints)?;
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE turns SET status = 'ready', closed_at = ?1, hints = ?2, items = ?3
             WHERE window_id = ?4 AND status = 'pending'",
            params![closed_at, hints_json, items_json, window_id],
        )?;
        if updated == 0 {
            return Err(StoreError::TurnNotFound {
                window_id: window_id.to_string(),
            });
        }
        Ok(())
    }

    /// Fetches every `ready` turn for a session, oldest first.
    pub fn poll_ready(&self, account_id: &str, label: &str) -> Result<Vec<Turn>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT window_id, account_id, label, chat_id, status, opened_at, closed_at,
                    hints, items, response, claimed_at, delivered_at, skipped_at,
                    wa_message_id, error
             FROM turns
             WHERE account_id = ?1 AND label = ?2 AND status = 'ready'
             ORDER BY closed_at ASC",
        )?;
        let rows = stmt
            .query_map(params![account_id, label], map_turn_row)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            turns.push(row?);
        }
        Ok(turns)
    }

    /// Atomically transitions a single `ready` turn to `sending`, returning it
    /// only if this call won the race: a conditional UPDATE inside a
    /// transaction, giving at-most-once delivery under concurrent pollers.
    pub fn claim_ready_turn(&self, window_id: &str) -> Result<Option<Turn>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_millis();
        let claimed = tx.execute(
            "UPDATE turns SET status = 'sending', claimed_at = ?1
             WHERE window_id = ?2 AND status = 'ready'",
            params![now, window_id],
        )?;
        if claimed == 0 {
            tx.commit()?;
            return Ok(None);
        }
        let turn = tx
            .query_row(
                "SELECT window_id, account_id, label, chat_id, status, opened_at, closed_at,
                        hints, items, response, claimed_at, delivered_at, skipped_at,
                        wa_message_id, error
                 FROM turns WHERE window_id = ?1",
                params![window_id],
                map_turn_row,
            )
            .optional()?;
        tx.commit()?;
        Ok(turn)
    }

    pub fn mark_turn_delivered(&self, window_id: &str, wa_message_id: &str) -> Result<()> {
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE turns SET status = 'delivered', delivered_at = ?1, wa_message_id = ?2
             WHERE window_id = ?3 AND status = 'sending'",
            params![now, wa_message_id, window_id],
        )?;
        if updated == 0 {
            return Err(StoreError::TurnNotFound {
                window_id: window_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn mark_turn_skipped(&self, window_id: &str) -> Result<()> {
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE turns SET status = 'skipped', skipped_at = ?1
             WHERE window_id = ?2 AND status IN ('ready', 'sending')",
            params![now, window_id],
        )?;
        if updated == 0 {
            return Err(StoreError::TurnNotFound {
                window_id: window_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn mark_turn_error(&self, window_id: &str, stage: &str, detail: &str) -> Result<()> {
        let error_json = serde_json::to_string(&crate::types::TurnErrorDetail {
            stage: stage.to_string(),
            detail: detail.to_string(),
        })?;
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE turns SET status = 'error', error = ?1 WHERE window_id = ?2",
            params![error_json, window_id],
        )?;
        if updated == 0 {
            return Err(StoreError::TurnNotFound {
                window_id: window_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_turn_response(&self, window_id: &str, response_json: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE turns SET response = ?1 WHERE window_id = ?2",
            params![response_json, window_id],
        )?;
        if updated == 0 {
            return Err(StoreError::TurnNotFound {
                window_id: window_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn turn(&self, window_id: &str) -> Result<Option<Turn>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT window_id, account_id, label, chat_id, status, opened_at, closed_at,
                    hints, items, response, claimed_at, delivered_at, skipped_at,
                    wa_message_id, error
             FROM turns WHERE window_id = ?1",
            params![window_id],
            map_turn_row,
        )
        .optional()
        .map_err(StoreError::from)
    }
}

fn map_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let allowlist_json: String = row.get(9)?;
    let blocklist_json: String = row.get(10)?;
    let mode_str: String = row.get(8)?;
    Ok(SessionRecord {
        account_id: row.get(0)?,
        label: row.get(1)?,
        wa_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        last_ready_at: row.get(5)?,
        policy: SessionPolicyDoc {
            enabled: row.get::<_, i64>(6)? != 0,
            receive_from_bots: row.get::<_, i64>(7)? != 0,
            mode: mode_str.parse().unwrap_or(PolicyMode::All),
            allowlist: serde_json::from_str(&allowlist_json).unwrap_or_default(),
            blocklist: serde_json::from_str(&blocklist_json).unwrap_or_default(),
        },
    })
}

fn map_turn_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Turn> {
    let status_str: String = row.get(4)?;
    let hints_json: String = row.get(7)?;
    let items_json: String = row.get(8)?;
    let response_json: Option<String> = row.get(9)?;
    let error_json: Option<String> = row.get(14)?;

    let to_sql_err = |e: serde_json::Error| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    };

    Ok(Turn {
        status: status_str.parse().unwrap_or(TurnStatus::Pending),
        opened_at: row.get(5)?,
        closed_at: row.get(6)?,
        meta: TurnMeta {
            account_id: row.get(1)?,
            label: row.get(2)?,
            chat_id: ChatId::from(row.get::<_, String>(3)?),
            window_id: row.get(0)?,
        },
        hints: serde_json::from_str(&hints_json).map_err(to_sql_err)?,
        items: serde_json::from_str(&items_json).map_err(to_sql_err)?,
        response: response_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(to_sql_err)?,
        claimed_at: row.get(10)?,
        delivered_at: row.get(11)?,
        skipped_at: row.get(12)?,
        wa_message_id: row.get(13)?,
        error: error_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(to_sql_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_session_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let a = store.get_or_create_session("acct1", "main").unwrap();
        let b = store.get_or_create_session("acct1", "main").unwrap();
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(store.list_sessions("acct1").unwrap().len(), 1);
    }

    #[test]
    fn claim_ready_turn_only_succeeds_once() {
        let store = Store::open_in_memory().unwrap();
        store.get_or_create_session("acct1", "main").unwrap();
        let chat = ChatId::from("5551234@c.us");
        let hints = Hints {
            last_inbound: Modality::Text,
            explicit: None,
            lang: None,
        };
        store
            .open_turn(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat,
                "w1",
                1,
                &hints,
            )
            .unwrap();
        store.close_turn_ready("w1", &[], 2, &hints).unwrap();

        let first = store.claim_ready_turn("w1").unwrap();
        assert!(first.is_some());
        let second = store.claim_ready_turn("w1").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn poll_ready_only_returns_ready_turns() {
        let store = Store::open_in_memory().unwrap();
        store.get_or_create_session("acct1", "main").unwrap();
        let chat = ChatId::from("5551234@c.us");
        let hints = Hints {
            last_inbound: Modality::Text,
            explicit: None,
            lang: None,
        };
        store
            .open_turn(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat,
                "w2",
                1,
                &hints,
            )
            .unwrap();
        assert!(store.poll_ready("acct1", "main").unwrap().is_empty());
        store.close_turn_ready("w2", &[], 2, &hints).unwrap();
        assert_eq!(store.poll_ready("acct1", "main").unwrap().len(), 1);
    }

    #[test]
    fn mark_turn_delivered_requires_sending_state() {
        let store = Store::open_in_memory().unwrap();
        store.get_or_create_session("acct1", "main").unwrap();
        let chat = ChatId::from("5551234@c.us");
        let hints = Hints {
            last_inbound: Modality::Text,
            explicit: None,
            lang: None,
        };
        store
            .open_turn(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat,
                "w3",
                1,
                &hints,
            )
            .unwrap();
        store.close_turn_ready("w3", &[], 2, &hints).unwrap();
        assert!(store.mark_turn_delivered("w3", "wamid.1").is_err());
        store.claim_ready_turn("w3").unwrap();
        store.mark_turn_delivered("w3", "wamid.1").unwrap();
        let turn = store.turn("w3").unwrap().unwrap();
        assert_eq!(turn.status, TurnStatus::Delivered);
        assert_eq!(turn.wa_message_id.as_deref(), Some("wamid.1"));
    }
}

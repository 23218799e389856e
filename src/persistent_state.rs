use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Serialize};
use serenity::all::{MessageId, ScheduledEventId, UserId};
use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    path::PathBuf,
};

const STATE_DIR_REL_HOME: &str = ".config/scrimbot";

const SESSIONS_FILE: &str = "sessions.json";
const ATTENDANCE_FILE: &str = "attendance.json";
const WINS_FILE: &str = "wins.json";

/// State which persists across sessions.  Three independent documents; a
/// missing file is the same as an empty map.
pub struct PersistentState {
    pub sessions: SessionMap,
    pub attendance: AttendanceBook,
    pub wins: WinTally,
}

impl PersistentState {
    pub async fn load() -> Result<Self> {
        Ok(Self {
            sessions: SessionMap::load().await?,
            attendance: AttendanceBook::load().await?,
            wins: WinTally::load().await?,
        })
    }
}

/// Which signup message belongs to which scheduled event.  At most one entry
/// is live at a time; the surrounding commands enforce that.
#[derive(Default, serde::Serialize, serde::Deserialize)]
pub struct SessionMap(HashMap<ScheduledEventId, MessageId>);

impl SessionMap {
    pub async fn load() -> Result<Self> {
        load_doc(SESSIONS_FILE).await
    }

    pub async fn save(&self) -> Result<()> {
        save_doc(SESSIONS_FILE, self).await
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScheduledEventId, MessageId)> + '_ {
        self.0.iter().map(|(event_id, msg_id)| (*event_id, *msg_id))
    }

    pub fn message_ids(&self) -> Vec<MessageId> {
        self.0.values().copied().collect()
    }

    pub fn message_for(&self, event_id: ScheduledEventId) -> Option<MessageId> {
        self.0.get(&event_id).copied()
    }

    pub fn session_for_message(&self, message_id: MessageId) -> Option<ScheduledEventId> {
        self.0
            .iter()
            .find(|(_, msg_id)| **msg_id == message_id)
            .map(|(event_id, _)| *event_id)
    }

    pub fn contains_message(&self, message_id: MessageId) -> bool {
        self.0.values().any(|msg_id| *msg_id == message_id)
    }

    pub fn insert(&mut self, event_id: ScheduledEventId, message_id: MessageId) {
        self.0.insert(event_id, message_id);
    }

    pub fn remove(&mut self, event_id: ScheduledEventId) -> Option<MessageId> {
        self.0.remove(&event_id)
    }

    pub fn remove_message(&mut self, message_id: MessageId) -> bool {
        let before = self.0.len();
        self.0.retain(|_, msg_id| *msg_id != message_id);
        self.0.len() != before
    }

    /// Point the existing signup message at a replacement event.  Used when a
    /// session is recreated after Discord ended it on its own.
    pub fn rekey(&mut self, old: ScheduledEventId, new: ScheduledEventId) -> bool {
        match self.0.remove(&old) {
            Some(message_id) => {
                self.0.insert(new, message_id);
                true
            }
            None => false,
        }
    }
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
pub struct AttendanceRecord {
    pub registered: u64,
    pub attended: u64,
}

/// Per-member signup and show-up counters.  Counters only ever go up.
#[derive(Default, serde::Serialize, serde::Deserialize)]
pub struct AttendanceBook(HashMap<UserId, AttendanceRecord>);

impl AttendanceBook {
    pub async fn load() -> Result<Self> {
        load_doc(ATTENDANCE_FILE).await
    }

    pub async fn save(&self) -> Result<()> {
        save_doc(ATTENDANCE_FILE, self).await
    }

    /// Credit one sync point: everyone registered gets a registration tick,
    /// and those also sitting in a voice channel get an attendance tick.
    /// Returns (registered, attended) counts for this sample.
    pub fn credit(
        &mut self,
        registered: &HashSet<UserId>,
        in_voice: &HashSet<UserId>,
    ) -> (usize, usize) {
        let mut attended = 0;
        for user_id in registered {
            let record = self.0.entry(*user_id).or_default();
            record.registered += 1;
            if in_voice.contains(user_id) {
                record.attended += 1;
                attended += 1;
            }
        }
        (registered.len(), attended)
    }
}

/// Scrim wins per member.
#[derive(Default, serde::Serialize, serde::Deserialize)]
pub struct WinTally(HashMap<UserId, u64>);

impl WinTally {
    pub async fn load() -> Result<Self> {
        load_doc(WINS_FILE).await
    }

    pub async fn save(&self) -> Result<()> {
        save_doc(WINS_FILE, self).await
    }

    /// Returns the member's new total.
    pub fn record_win(&mut self, user_id: UserId) -> u64 {
        let total = self.0.entry(user_id).or_default();
        *total += 1;
        *total
    }

    /// Standings, best first.  Ties break on user id so the order is stable.
    pub fn standings(&self) -> Vec<(UserId, u64)> {
        let mut standings: Vec<(UserId, u64)> =
            self.0.iter().map(|(id, wins)| (*id, *wins)).collect();
        standings.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        standings
    }
}

fn state_path(filename: &str) -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(STATE_DIR_REL_HOME).join(filename))
        .ok_or(anyhow!("Could not find home directory"))
}

async fn load_doc<T>(filename: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = state_path(filename)?;

    match tokio::fs::read(&path).await {
        Ok(data) => serde_json::from_slice(&data).map_err(|e| {
            anyhow!(
                "Could not parse state at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(anyhow!(
            "Could not read state at `{}`: {}",
            path.to_string_lossy(),
            e
        )),
    }
}

async fn save_doc<T: Serialize>(filename: &str, value: &T) -> Result<()> {
    let path = state_path(filename)?;
    let serialized = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow!("Could not serialize state: {}", e))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            anyhow!(
                "Could not create directory `{}`: {}",
                parent.to_string_lossy(),
                e
            )
        })?;
    }

    // Write to a temporary file in the same directory, then atomically rename
    // it over the target so a crash mid-write can't leave a torn document.
    let tmp_path = path.with_extension("json.new");

    tokio::fs::write(&tmp_path, serialized).await.map_err(|e| {
        anyhow!(
            "Could not write state to temporary file `{}`: {}",
            tmp_path.to_string_lossy(),
            e
        )
    })?;

    tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
        anyhow!(
            "Could not rename temporary file `{}` to `{}`: {}",
            tmp_path.to_string_lossy(),
            path.to_string_lossy(),
            e
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rekey_keeps_the_signup_message() {
        let mut sessions = SessionMap::default();
        let old = ScheduledEventId::new(10);
        let new = ScheduledEventId::new(20);
        let message = MessageId::new(99);

        sessions.insert(old, message);
        assert!(sessions.rekey(old, new));

        assert_eq!(sessions.message_for(new), Some(message));
        assert_eq!(sessions.message_for(old), None);
        assert!(sessions.contains_message(message));
    }

    #[test]
    fn rekey_of_an_unknown_session_is_a_no_op() {
        let mut sessions = SessionMap::default();
        sessions.insert(ScheduledEventId::new(1), MessageId::new(2));

        assert!(!sessions.rekey(ScheduledEventId::new(3), ScheduledEventId::new(4)));
        assert_eq!(sessions.message_for(ScheduledEventId::new(4)), None);
        assert_eq!(
            sessions.message_for(ScheduledEventId::new(1)),
            Some(MessageId::new(2))
        );
    }

    #[test]
    fn remove_message_drops_only_that_entry() {
        let mut sessions = SessionMap::default();
        sessions.insert(ScheduledEventId::new(1), MessageId::new(11));
        sessions.insert(ScheduledEventId::new(2), MessageId::new(22));

        assert!(sessions.remove_message(MessageId::new(11)));
        assert!(!sessions.remove_message(MessageId::new(11)));
        assert!(!sessions.contains_message(MessageId::new(11)));
        assert!(sessions.contains_message(MessageId::new(22)));
    }

    #[test]
    fn session_map_survives_a_json_round_trip() {
        let mut sessions = SessionMap::default();
        sessions.insert(ScheduledEventId::new(7), MessageId::new(70));

        let json = serde_json::to_string(&sessions).unwrap();
        let restored: SessionMap = serde_json::from_str(&json).unwrap();

        assert_eq!(
            restored.message_for(ScheduledEventId::new(7)),
            Some(MessageId::new(70))
        );
    }

    #[test]
    fn attendance_is_a_point_sample() {
        let mut book = AttendanceBook::default();
        let registered: HashSet<UserId> = [UserId::new(1), UserId::new(2)].into();
        let in_voice: HashSet<UserId> = [UserId::new(2), UserId::new(3)].into();

        let (reg, att) = book.credit(&registered, &in_voice);
        assert_eq!((reg, att), (2, 1));

        // A second sample only ever increments.
        book.credit(&registered, &HashSet::new());
        let record = &book.0[&UserId::new(2)];
        assert_eq!(record.registered, 2);
        assert_eq!(record.attended, 1);

        // User 3 was in voice but never registered; no record for them.
        assert!(!book.0.contains_key(&UserId::new(3)));
    }

    #[test]
    fn standings_sort_by_wins_descending() {
        let mut wins = WinTally::default();
        wins.record_win(UserId::new(1));
        wins.record_win(UserId::new(2));
        wins.record_win(UserId::new(2));
        wins.record_win(UserId::new(3));

        let standings = wins.standings();
        assert_eq!(standings[0], (UserId::new(2), 2));
        // Tied entries come out in id order.
        assert_eq!(standings[1], (UserId::new(1), 1));
        assert_eq!(standings[2], (UserId::new(3), 1));
    }
}

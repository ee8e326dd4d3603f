use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Upper bound on replies walked when rebuilding a thread
pub const MAX_THREAD_DEPTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MailStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Mail {
    pub id: u64,
    /// Employee that wrote the mail
    pub sender_id: u64,
    /// Set when the recipient is an employee mailbox
    pub recipient_id: Option<u64>,
    #[schema(example = "jane.roe@company.com")]
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    #[schema(example = "sent")]
    pub status: String,
    pub is_read: bool,
    /// Starred by the caller. Sender and recipient star independently.
    #[sqlx(skip)]
    pub is_starred: bool,
    /// Mail this one replies to
    pub parent_id: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,

    #[serde(skip)]
    pub starred_by_sender: bool,
    #[serde(skip)]
    pub starred_by_recipient: bool,
    #[serde(skip)]
    pub deleted_by_sender: bool,
    #[serde(skip)]
    pub deleted_by_recipient: bool,
}

/// The two mailboxes a mail lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Sender,
    Recipient,
}

impl Side {
    pub fn owner_column(self) -> &'static str {
        match self {
            Side::Sender => "sender_id",
            Side::Recipient => "recipient_id",
        }
    }

    pub fn star_column(self) -> &'static str {
        match self {
            Side::Sender => "starred_by_sender",
            Side::Recipient => "starred_by_recipient",
        }
    }

    pub fn deleted_column(self) -> &'static str {
        match self {
            Side::Sender => "deleted_by_sender",
            Side::Recipient => "deleted_by_recipient",
        }
    }

    /// `WHERE` clause for this mailbox, bound to one employee id
    pub fn mailbox_filter(self) -> String {
        format!("{} = ? AND {} = FALSE", self.owner_column(), self.deleted_column())
    }
}

/// What deleting a mail from one mailbox leaves behind
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Hide {
        deleted_by_sender: bool,
        deleted_by_recipient: bool,
    },
    Remove,
}

impl Mail {
    /// Sides the employee is on. A mail sent to oneself has both.
    pub fn sides(&self, employee_id: u64) -> Vec<Side> {
        let mut sides = Vec::with_capacity(2);
        if self.sender_id == employee_id {
            sides.push(Side::Sender);
        }
        if self.recipient_id == Some(employee_id) {
            sides.push(Side::Recipient);
        }
        sides
    }

    pub fn visible_to(&self, employee_id: u64) -> bool {
        (self.sender_id == employee_id && !self.deleted_by_sender)
            || (self.recipient_id == Some(employee_id) && !self.deleted_by_recipient)
    }

    /// Fills `is_starred` with the employee's own star
    pub fn viewed_by(mut self, employee_id: u64) -> Self {
        self.is_starred = (self.sender_id == employee_id && self.starred_by_sender)
            || (self.recipient_id == Some(employee_id) && self.starred_by_recipient);
        self
    }

    pub fn after_delete_by(&self, employee_id: u64) -> DeleteOutcome {
        let by_sender = self.deleted_by_sender || self.sender_id == employee_id;
        let by_recipient = self.deleted_by_recipient || self.recipient_id == Some(employee_id);

        // external mail has no recipient mailbox to keep it alive
        if by_sender && (self.recipient_id.is_none() || by_recipient) {
            DeleteOutcome::Remove
        } else {
            DeleteOutcome::Hide {
                deleted_by_sender: by_sender,
                deleted_by_recipient: by_recipient,
            }
        }
    }
}

/// Ids of the conversation `start` belongs to: its root first, then replies
/// level by level. `links` maps every known mail id to its parent. Parents
/// missing from `links` end the walk up, and cycles are cut.
pub fn conversation(start: u64, links: &HashMap<u64, Option<u64>>) -> Vec<u64> {
    let mut root = start;
    let mut seen = HashSet::from([start]);
    for _ in 0..MAX_THREAD_DEPTH {
        match links.get(&root).copied().flatten() {
            Some(parent) if links.contains_key(&parent) && seen.insert(parent) => root = parent,
            _ => break,
        }
    }

    let mut children: HashMap<u64, Vec<u64>> = HashMap::new();
    for (&id, &parent) in links {
        if let Some(parent) = parent {
            children.entry(parent).or_default().push(id);
        }
    }
    for replies in children.values_mut() {
        replies.sort_unstable();
    }

    let mut ids = Vec::new();
    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([(root, 0usize)]);
    while let Some((id, depth)) = queue.pop_front() {
        ids.push(id);
        if depth >= MAX_THREAD_DEPTH {
            continue;
        }
        for &reply in children.get(&id).map(Vec::as_slice).unwrap_or_default() {
            if visited.insert(reply) {
                queue.push_back((reply, depth + 1));
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(sender_id: u64, recipient_id: Option<u64>) -> Mail {
        Mail {
            id: 1,
            sender_id,
            recipient_id,
            recipient_email: "someone@company.com".into(),
            subject: "Hi".into(),
            body: "Body".into(),
            status: MailStatus::Sent.to_string(),
            is_read: false,
            is_starred: false,
            parent_id: None,
            created_at: Utc::now(),
            starred_by_sender: false,
            starred_by_recipient: false,
            deleted_by_sender: false,
            deleted_by_recipient: false,
        }
    }

    fn links(pairs: &[(u64, Option<u64>)]) -> HashMap<u64, Option<u64>> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn stars_are_per_side() {
        let mut m = mail(1, Some(2));
        m.starred_by_sender = true;

        assert!(m.clone().viewed_by(1).is_starred);
        assert!(!m.clone().viewed_by(2).is_starred);
        assert!(!m.viewed_by(3).is_starred);
    }

    #[test]
    fn stars_never_leak_into_json() {
        let mut m = mail(1, Some(2));
        m.starred_by_recipient = true;

        let value = serde_json::to_value(m.viewed_by(1)).unwrap();
        assert_eq!(value["is_starred"], false);
        assert!(value.get("starred_by_recipient").is_none());
        assert!(value.get("deleted_by_sender").is_none());
    }

    #[test]
    fn sides_of_a_mail() {
        assert_eq!(mail(1, Some(2)).sides(1), vec![Side::Sender]);
        assert_eq!(mail(1, Some(2)).sides(2), vec![Side::Recipient]);
        assert_eq!(mail(1, Some(1)).sides(1), vec![Side::Sender, Side::Recipient]);
        assert!(mail(1, None).sides(2).is_empty());
        assert_eq!(Side::Recipient.mailbox_filter(), "recipient_id = ? AND deleted_by_recipient = FALSE");
    }

    #[test]
    fn deleting_hides_only_the_callers_copy() {
        let m = mail(1, Some(2));
        assert_eq!(
            m.after_delete_by(1),
            DeleteOutcome::Hide {
                deleted_by_sender: true,
                deleted_by_recipient: false
            }
        );
        assert_eq!(
            m.after_delete_by(2),
            DeleteOutcome::Hide {
                deleted_by_sender: false,
                deleted_by_recipient: true
            }
        );
    }

    #[test]
    fn row_goes_once_both_sides_delete() {
        let mut m = mail(1, Some(2));
        m.deleted_by_recipient = true;
        assert!(!m.visible_to(2));
        assert!(m.visible_to(1));
        assert_eq!(m.after_delete_by(1), DeleteOutcome::Remove);

        let mut m = mail(1, Some(2));
        m.deleted_by_sender = true;
        assert_eq!(m.after_delete_by(2), DeleteOutcome::Remove);
    }

    #[test]
    fn external_mail_goes_when_sender_deletes() {
        assert_eq!(mail(1, None).after_delete_by(1), DeleteOutcome::Remove);
        assert_eq!(mail(1, Some(1)).after_delete_by(1), DeleteOutcome::Remove);
    }

    #[test]
    fn thread_is_the_same_from_any_mail() {
        let known = links(&[(1, None), (2, Some(1)), (3, Some(2)), (4, Some(2))]);

        for start in [1, 2, 3, 4] {
            assert_eq!(conversation(start, &known), vec![1, 2, 3, 4], "from {start}");
        }
    }

    #[test]
    fn thread_excludes_other_conversations() {
        let known = links(&[(1, None), (2, Some(1)), (10, None), (11, Some(10))]);

        assert_eq!(conversation(2, &known), vec![1, 2]);
        assert_eq!(conversation(11, &known), vec![10, 11]);
    }

    #[test]
    fn thread_survives_cycles_and_missing_parents() {
        let cyclic = links(&[(5, Some(6)), (6, Some(5))]);
        let ids = conversation(5, &cyclic);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&5) && ids.contains(&6));

        // parent row was removed; the reply becomes the root
        let orphaned = links(&[(8, Some(7)), (9, Some(8))]);
        assert_eq!(conversation(9, &orphaned), vec![8, 9]);
    }
}

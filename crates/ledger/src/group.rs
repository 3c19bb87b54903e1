//! Groups and their membership.

use serde::{Deserialize, Serialize};

use splitledger_core::{GroupId, LedgerError, LedgerResult, UserId};

/// Request to create a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
}

impl NewGroup {
    /// Trimmed group; the name must not be blank.
    pub fn validated(self) -> LedgerResult<Self> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidGroupName(
                "group name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }
}

/// A group with its current members, ordered by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<UserId>,
}

impl Group {
    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.binary_search(&user_id).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_must_not_be_blank() {
        let group = NewGroup {
            name: "  Goa trip ".to_string(),
        }
        .validated()
        .unwrap();
        assert_eq!(group.name, "Goa trip");

        let err = NewGroup {
            name: "   ".to_string(),
        }
        .validated()
        .unwrap_err();
        assert_eq!(err.code(), "invalid_group_name");
    }

    #[test]
    fn membership_lookup_uses_sorted_members() {
        let group = Group {
            id: GroupId::new(1),
            name: "flat".to_string(),
            members: vec![UserId::new(2), UserId::new(5), UserId::new(9)],
        };
        assert!(group.is_member(UserId::new(5)));
        assert!(!group.is_member(UserId::new(3)));
    }
}

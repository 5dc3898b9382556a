use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// External collaborator: the organizational hierarchy. The engine only asks
/// questions of it and never writes; implementations may be snapshots.
pub trait OrgDirectory: Send + Sync {
    /// Nominal approver for a requester at the given escalation level:
    /// level 0 is the direct manager, level n the nth ancestor. When the
    /// chain is shorter than the level, the topmost leader answers.
    fn approver_for(&self, requester_id: &str, escalation_level: u32) -> Option<String>;

    /// Whether the directory knows this user at all.
    fn is_member(&self, user_id: &str) -> bool;

    fn manager_of(&self, user_id: &str) -> Option<String>;

    fn is_admin(&self, user_id: &str) -> bool;

    fn same_team(&self, a: &str, b: &str) -> bool;

    /// Whether `leader_id` sits anywhere above `user_id` in the chain.
    fn is_upper_leader(&self, leader_id: &str, user_id: &str) -> bool;

    /// The top of the reporting chain for a user, if any.
    fn top_leader_for(&self, user_id: &str) -> Option<String>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMember {
    pub user_id: String,
    pub manager_id: Option<String>,
    pub team: String,
    pub admin: bool,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryOrgDirectory {
    members: HashMap<String, OrgMember>,
}

impl InMemoryOrgDirectory {
    pub fn new(members: Vec<OrgMember>) -> Self {
        let members =
            members.into_iter().map(|member| (normalize_key(&member.user_id), member)).collect();
        Self { members }
    }

    /// Reporting chain above a user, nearest manager first. Cycle-guarded.
    fn manager_chain(&self, user_id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = normalize_key(user_id);
        let mut visited = HashSet::new();

        loop {
            if !visited.insert(current.clone()) {
                break;
            }

            let Some(member) = self.members.get(&current) else {
                break;
            };
            let Some(manager_id) = &member.manager_id else {
                break;
            };

            let manager_key = normalize_key(manager_id);
            chain.push(manager_key.clone());
            current = manager_key;
        }

        chain
    }
}

impl OrgDirectory for InMemoryOrgDirectory {
    fn approver_for(&self, requester_id: &str, escalation_level: u32) -> Option<String> {
        let chain = self.manager_chain(requester_id);
        if chain.is_empty() {
            return None;
        }
        let index = (escalation_level as usize).min(chain.len() - 1);
        Some(chain[index].clone())
    }

    fn is_member(&self, user_id: &str) -> bool {
        self.members.contains_key(&normalize_key(user_id))
    }

    fn manager_of(&self, user_id: &str) -> Option<String> {
        self.members
            .get(&normalize_key(user_id))
            .and_then(|member| member.manager_id.as_ref())
            .map(|manager_id| normalize_key(manager_id))
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.members.get(&normalize_key(user_id)).is_some_and(|member| member.admin)
    }

    fn same_team(&self, a: &str, b: &str) -> bool {
        match (self.members.get(&normalize_key(a)), self.members.get(&normalize_key(b))) {
            (Some(left), Some(right)) => {
                normalize_key(&left.team) == normalize_key(&right.team)
            }
            _ => false,
        }
    }

    fn is_upper_leader(&self, leader_id: &str, user_id: &str) -> bool {
        let leader_key = normalize_key(leader_id);
        self.manager_chain(user_id).contains(&leader_key)
    }

    fn top_leader_for(&self, user_id: &str) -> Option<String> {
        self.manager_chain(user_id).last().cloned()
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sub_groups: Vec<SubGroup>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Group {
    /// Ids of the members belonging to `sub_group`.
    pub fn members_of(&self, sub_group: &SubGroup) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| m.sub_groups.contains(&sub_group.id))
            .map(|m| m.id.clone())
            .collect()
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group(id={}, name={})", self.id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl fmt::Display for SubGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubGroup(id={}, name={})", self.id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub sub_groups: Vec<String>,
}

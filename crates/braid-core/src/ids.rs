use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(MessageId, "msg");
branded_id!(GroupId, "grp");
branded_id!(ToolCallId, "call");
branded_id!(BranchId, "branch");
branded_id!(CheckpointId, "ckpt");

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_id_kind_carries_its_prefix() {
        assert!(MessageId::new().as_str().starts_with("msg_"));
        assert!(GroupId::new().as_str().starts_with("grp_"));
        assert!(ToolCallId::new().as_str().starts_with("call_"));
        assert!(BranchId::new().as_str().starts_with("branch_"));
        assert!(CheckpointId::new().as_str().starts_with("ckpt_"));
    }

    #[test]
    fn fresh_ids_never_collide() {
        let ids: HashSet<String> = (0..100).map(|_| MessageId::new().to_string()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn external_ids_pass_through_verbatim() {
        // Branch ids coming off the wire ("main", backend-assigned names)
        // are not uuid-shaped and must survive untouched.
        assert_eq!(BranchId::from_raw("main").as_str(), "main");
        let parsed: CheckpointId = "ckpt-from-backend".parse().unwrap();
        assert_eq!(parsed.as_str(), "ckpt-from-backend");
    }

    #[test]
    fn display_and_serde_agree() {
        let id = MessageId::new();
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            format!("\"{id}\""),
        );
        let parsed: MessageId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn generated_ids_sort_by_creation() {
        // UUIDv7 is time-ordered, which keeps group ids stable to reason
        // about in logs and snapshots.
        let ids: Vec<GroupId> = (0..50).map(|_| GroupId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0].as_str() < w[1].as_str());
        }
    }
}

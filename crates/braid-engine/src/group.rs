use std::collections::HashSet;

use serde::Serialize;

use braid_core::{
    BranchId, FileRef, GroupId, MessageId, MessageMetadata, Role, ThreadMessage, ToolInvocation,
};

use crate::observer::{GroupingEvent, GroupingObserver, SkipReason};

/// One logical exchange: a user message plus all assistant text and tool
/// activity that followed before the next user message.
#[derive(Clone, Debug, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub user_message: Option<ThreadMessage>,
    /// Assistant text emitted before any tool call in the turn.
    pub pre_tool_message: Option<ThreadMessage>,
    /// The turn's final assistant text; later emissions supersede earlier.
    pub assistant_message: Option<ThreadMessage>,
    /// Anchor for regeneration: the first assistant emission that contributed
    /// text or tool calls.
    pub first_assistant_message_id: Option<MessageId>,
    /// Deduplicated by id; a later observation replaces an earlier one only
    /// when it brings a result or leaves `pending`.
    pub tool_calls: Vec<ToolInvocation>,
    pub attachments: Vec<FileRef>,
    pub branch: Option<BranchId>,
    pub branch_options: Vec<BranchId>,
    pub is_last: bool,
}

/// Accumulator for the group currently being assembled. Each fold step
/// consumes the open builder and yields a new one, so the pass carries no
/// mutable module state.
struct GroupBuilder {
    seed: MessageId,
    user_message: Option<ThreadMessage>,
    pre_tool_message: Option<ThreadMessage>,
    assistant_message: Option<ThreadMessage>,
    first_assistant_message_id: Option<MessageId>,
    tool_calls: Vec<ToolInvocation>,
    attachments: Vec<FileRef>,
    branch: Option<BranchId>,
    branch_options: Vec<BranchId>,
}

impl GroupBuilder {
    fn opened_by_human(message: &ThreadMessage, metadata: Option<MessageMetadata>) -> Self {
        let mut builder = Self {
            seed: message.id.clone(),
            user_message: Some(message.clone()),
            pre_tool_message: None,
            assistant_message: None,
            first_assistant_message_id: None,
            tool_calls: Vec::new(),
            attachments: message.attachments.clone(),
            branch: None,
            branch_options: Vec::new(),
        };
        builder.apply_metadata(metadata);
        builder
    }

    fn opened_by_assistant(message: &ThreadMessage) -> Self {
        Self {
            seed: message.id.clone(),
            user_message: None,
            pre_tool_message: None,
            assistant_message: None,
            first_assistant_message_id: None,
            tool_calls: Vec::new(),
            attachments: Vec::new(),
            branch: None,
            branch_options: Vec::new(),
        }
    }

    fn absorb_assistant(
        mut self,
        message: &ThreadMessage,
        calls: Vec<ToolInvocation>,
        metadata: Option<MessageMetadata>,
        observer: &dyn GroupingObserver,
    ) -> Self {
        let has_text = message.has_text();
        let has_tools = !calls.is_empty();
        self.merge_tool_calls(calls, observer);

        if has_text || has_tools {
            self.first_assistant_message_id
                .get_or_insert_with(|| message.id.clone());
        }

        if has_text && has_tools && self.pre_tool_message.is_none() {
            // Introductory text accompanying the first tool dispatch.
            self.pre_tool_message = Some(message.clone());
        } else if has_text {
            // Last text-bearing emission in the turn wins.
            self.assistant_message = Some(message.clone());
        } else if self.assistant_message.is_none() && self.pre_tool_message.is_none() && has_tools {
            // Text-less tool dispatch: keep a placeholder so the turn has a
            // stable anchor before any text exists.
            self.pre_tool_message = Some(message.clone());
        }

        // Branch forks are usually decided after generation, so assistant
        // metadata overrides whatever the user message carried.
        self.apply_metadata(metadata);
        self
    }

    fn merge_tool_calls(&mut self, calls: Vec<ToolInvocation>, observer: &dyn GroupingObserver) {
        for call in calls {
            match self.tool_calls.iter_mut().find(|c| c.id == call.id) {
                Some(existing) => {
                    if call.supersedes(existing) {
                        observer.on_event(GroupingEvent::ToolCallSuperseded { id: &call.id });
                        *existing = call;
                    } else {
                        observer.on_event(GroupingEvent::ToolCallRepeated { id: &call.id });
                    }
                }
                None => self.tool_calls.push(call),
            }
        }
    }

    fn apply_metadata(&mut self, metadata: Option<MessageMetadata>) {
        let Some(metadata) = metadata else { return };
        if metadata.branch.is_some() {
            self.branch = metadata.branch;
        }
        if !metadata.branch_options.is_empty() {
            self.branch_options = metadata.branch_options;
        }
    }

    fn finish(self) -> Group {
        Group {
            id: GroupId::from_raw(format!("grp_{}", self.seed)),
            user_message: self.user_message,
            pre_tool_message: self.pre_tool_message,
            assistant_message: self.assistant_message,
            first_assistant_message_id: self.first_assistant_message_id,
            tool_calls: self.tool_calls,
            attachments: self.attachments,
            branch: self.branch,
            branch_options: self.branch_options,
            is_last: false,
        }
    }
}

/// Reduce the flat conversation stream to renderable groups.
///
/// A single order-preserving pass: deterministic for a given input, never
/// errors, degrades by omission on malformed data. Safe to call on every
/// update tick; cost is O(messages).
pub fn group_messages<M, T>(
    messages: &[ThreadMessage],
    metadata_of: M,
    tool_calls_of: T,
    hidden: &HashSet<MessageId>,
    observer: &dyn GroupingObserver,
) -> Vec<Group>
where
    M: Fn(&ThreadMessage) -> Option<MessageMetadata>,
    T: Fn(&ThreadMessage) -> Vec<ToolInvocation>,
{
    let (mut groups, open) = messages.iter().fold(
        (Vec::new(), None::<GroupBuilder>),
        |(mut groups, open), message| {
            if hidden.contains(&message.id) {
                observer.on_event(GroupingEvent::MessageSkipped {
                    id: &message.id,
                    reason: SkipReason::Hidden,
                });
                return (groups, open);
            }
            match message.role {
                Role::System => {
                    observer.on_event(GroupingEvent::MessageSkipped {
                        id: &message.id,
                        reason: SkipReason::SystemRole,
                    });
                    (groups, open)
                }
                Role::Tool => {
                    observer.on_event(GroupingEvent::MessageSkipped {
                        id: &message.id,
                        reason: SkipReason::ToolRole,
                    });
                    (groups, open)
                }
                Role::Human => {
                    if let Some(builder) = open {
                        groups.push(builder.finish());
                    }
                    let builder = GroupBuilder::opened_by_human(message, metadata_of(message));
                    (groups, Some(builder))
                }
                Role::Ai => {
                    let builder = open.unwrap_or_else(|| {
                        observer.on_event(GroupingEvent::OrphanAssistant { id: &message.id });
                        GroupBuilder::opened_by_assistant(message)
                    });
                    let builder = builder.absorb_assistant(
                        message,
                        tool_calls_of(message),
                        metadata_of(message),
                        observer,
                    );
                    (groups, Some(builder))
                }
            }
        },
    );

    if let Some(builder) = open {
        groups.push(builder.finish());
    }
    if let Some(last) = groups.last_mut() {
        last.is_last = true;
    }
    groups
}

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use braid_core::{
    BranchId, CheckpointId, MessageId, MessageMetadata, Role, ThreadMessage, ToolCallState,
    ToolInvocation,
};

use crate::error::StoreError;
use crate::store::{EventStore, SubmitOptions};

#[derive(Clone)]
struct Entry {
    message: ThreadMessage,
    metadata: MessageMetadata,
}

#[derive(Clone, Default)]
struct Branch {
    entries: Vec<Entry>,
    /// Checkpoint taken after the latest human turn; attached to ai pushes.
    resume: Option<CheckpointId>,
    /// Fork point this branch diverged at, if any.
    fork: Option<(CheckpointId, usize)>,
}

struct ThreadState {
    branches: HashMap<BranchId, Branch>,
    active: BranchId,
    /// Checkpoint registry: id -> (branch it was taken on, entry position).
    checkpoints: HashMap<CheckpointId, (BranchId, usize)>,
    /// Sibling branches per fork checkpoint, in creation order.
    forks: HashMap<CheckpointId, Vec<BranchId>>,
    generating: bool,
}

/// Reference event store with checkpointed fork/replace branch semantics.
///
/// Submitting at a checkpoint forks a sibling branch when nothing but the
/// checkpointed turn follows it, and truncates the branch in place when later
/// turns exist. The writer API (`push_human`, `push_ai`, ...) doubles as the
/// streaming simulation for tests.
pub struct InMemoryThread {
    state: Mutex<ThreadState>,
}

impl Default for InMemoryThread {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryThread {
    pub fn new() -> Self {
        let main = BranchId::from_raw("main");
        let mut branches = HashMap::new();
        branches.insert(main.clone(), Branch::default());
        Self {
            state: Mutex::new(ThreadState {
                branches,
                active: main,
                checkpoints: HashMap::new(),
                forks: HashMap::new(),
                generating: false,
            }),
        }
    }

    /// Append a human turn on the active branch, checkpointing before and
    /// after it. Returns the message id.
    pub fn push_human(&self, text: impl Into<String>) -> MessageId {
        let mut state = self.state.lock();
        let active = state.active.clone();
        append_human(&mut state, &active, ThreadMessage::human(text), None)
    }

    /// Append a prepared human message (attachments, fixed id) on the active
    /// branch.
    pub fn push_human_message(&self, message: ThreadMessage) -> MessageId {
        let mut state = self.state.lock();
        let active = state.active.clone();
        append_human(&mut state, &active, message, None)
    }

    /// Append an assistant emission on the active branch.
    pub fn push_ai(&self, message: ThreadMessage) -> MessageId {
        let mut state = self.state.lock();
        let active = state.active.clone();
        let resume = state
            .branches
            .get(&active)
            .and_then(|b| b.resume.clone());
        let metadata = MessageMetadata {
            branch: Some(active.clone()),
            branch_options: Vec::new(),
            parent_checkpoint: resume,
        };
        push_entry(&mut state, &active, Entry { message: message.clone(), metadata });
        message.id
    }

    /// Append a system message (invisible to grouping, present in the stream).
    pub fn push_system(&self, text: impl Into<String>) -> MessageId {
        let mut state = self.state.lock();
        let active = state.active.clone();
        let message = ThreadMessage::system(text);
        let id = message.id.clone();
        push_entry(
            &mut state,
            &active,
            Entry {
                message,
                metadata: MessageMetadata {
                    branch: Some(active.clone()),
                    ..Default::default()
                },
            },
        );
        id
    }

    /// Complete a pending tool call on the newest ai message that carries it,
    /// and append the raw tool-role result message.
    pub fn complete_tool_call(
        &self,
        call_id: &str,
        result: impl Into<String>,
    ) -> Result<(), StoreError> {
        let result = result.into();
        let mut state = self.state.lock();
        let active = state.active.clone();
        let branch = state
            .branches
            .get_mut(&active)
            .ok_or_else(|| StoreError::NotFound(format!("branch {active}")))?;

        let slot = branch
            .entries
            .iter_mut()
            .rev()
            .filter(|e| e.message.role == Role::Ai)
            .find_map(|e| {
                e.message
                    .tool_calls
                    .iter_mut()
                    .find(|tc| tc.id.as_str() == call_id)
            })
            .ok_or_else(|| StoreError::NotFound(format!("tool call {call_id}")))?;
        slot.result = Some(result.clone());
        slot.state = ToolCallState::Success;

        let message = ThreadMessage::tool_result(result);
        push_entry(
            &mut state,
            &active,
            Entry {
                message,
                metadata: MessageMetadata {
                    branch: Some(active.clone()),
                    ..Default::default()
                },
            },
        );
        Ok(())
    }

    pub fn active_branch(&self) -> BranchId {
        self.state.lock().active.clone()
    }

    pub fn branch_count(&self) -> usize {
        self.state.lock().branches.len()
    }

    pub fn is_generating(&self) -> bool {
        self.state.lock().generating
    }
}

fn append_human(
    state: &mut ThreadState,
    branch_id: &BranchId,
    message: ThreadMessage,
    parent: Option<CheckpointId>,
) -> MessageId {
    let pos = state
        .branches
        .get(branch_id)
        .map(|b| b.entries.len())
        .unwrap_or(0);

    let before = parent.unwrap_or_else(|| {
        let ck = CheckpointId::new();
        state
            .checkpoints
            .insert(ck.clone(), (branch_id.clone(), pos));
        ck
    });

    let id = message.id.clone();
    let metadata = MessageMetadata {
        branch: Some(branch_id.clone()),
        branch_options: Vec::new(),
        parent_checkpoint: Some(before),
    };
    push_entry(state, branch_id, Entry { message, metadata });

    // Checkpoint after the human turn: regeneration resumes here.
    let after = CheckpointId::new();
    state
        .checkpoints
        .insert(after.clone(), (branch_id.clone(), pos + 1));
    if let Some(branch) = state.branches.get_mut(branch_id) {
        branch.resume = Some(after);
    }
    id
}

fn push_entry(state: &mut ThreadState, branch_id: &BranchId, entry: Entry) {
    let fork = state.branches.get(branch_id).and_then(|b| b.fork.clone());
    if let Some(branch) = state.branches.get_mut(branch_id) {
        branch.entries.push(entry);
    }
    // First entry past a fork point carries the sibling options.
    if let Some((ck, pos)) = fork {
        let len = state
            .branches
            .get(branch_id)
            .map(|b| b.entries.len())
            .unwrap_or(0);
        if len == pos + 1 {
            refresh_fork(state, &ck);
        }
    }
}

/// Re-decorate the first diverging entry of every sibling at a fork point so
/// each carries its own branch id and the current option list.
fn refresh_fork(state: &mut ThreadState, ck: &CheckpointId) {
    let options = match state.forks.get(ck) {
        Some(options) => options.clone(),
        None => return,
    };
    let pos = match state.checkpoints.get(ck) {
        Some((_, pos)) => *pos,
        None => return,
    };
    for sibling in &options {
        if let Some(entry) = state
            .branches
            .get_mut(sibling)
            .and_then(|b| b.entries.get_mut(pos))
        {
            entry.metadata.branch = Some(sibling.clone());
            entry.metadata.branch_options = options.clone();
        }
    }
}

fn submit_at_checkpoint(
    state: &mut ThreadState,
    ck: &CheckpointId,
    input: Option<String>,
) -> Result<(), StoreError> {
    let (origin, pos) = state
        .checkpoints
        .get(ck)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("checkpoint {ck}")))?;

    let origin_len = state
        .branches
        .get(&origin)
        .map(|b| b.entries.len())
        .ok_or_else(|| StoreError::NotFound(format!("branch {origin}")))?;
    if pos > origin_len {
        return Err(StoreError::Conflict(format!(
            "checkpoint {ck} is past the end of branch {origin}"
        )));
    }

    let later_human = state.branches[&origin].entries[pos..]
        .iter()
        .skip(1)
        .any(|e| e.message.role == Role::Human);

    if later_human {
        // Later turns exist: destructive replace in place.
        debug!(checkpoint = %ck, branch = %origin, "replacing history at checkpoint");
        if let Some(branch) = state.branches.get_mut(&origin) {
            branch.entries.truncate(pos);
            branch.resume = Some(ck.clone());
        }
        state.active = origin.clone();
        if let Some(text) = input {
            append_human(state, &origin, ThreadMessage::human(text), Some(ck.clone()));
        }
    } else {
        // Checkpointed turn is the tip: fork a sibling branch.
        let new_id = BranchId::new();
        debug!(checkpoint = %ck, branch = %origin, fork = %new_id, "forking branch at checkpoint");
        let prefix = state.branches[&origin].entries[..pos].to_vec();
        state.branches.insert(
            new_id.clone(),
            Branch {
                entries: prefix,
                resume: Some(ck.clone()),
                fork: Some((ck.clone(), pos)),
            },
        );
        state
            .forks
            .entry(ck.clone())
            .or_insert_with(|| vec![origin.clone()])
            .push(new_id.clone());
        state.active = new_id.clone();
        if let Some(text) = input {
            append_human(state, &new_id, ThreadMessage::human(text), Some(ck.clone()));
        }
        refresh_fork(state, ck);
    }
    Ok(())
}

#[async_trait]
impl EventStore for InMemoryThread {
    fn list_messages(&self) -> Vec<ThreadMessage> {
        let state = self.state.lock();
        state.branches[&state.active]
            .entries
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    fn metadata_of(&self, id: &MessageId) -> Option<MessageMetadata> {
        let state = self.state.lock();
        state.branches[&state.active]
            .entries
            .iter()
            .find(|e| &e.message.id == id)
            .map(|e| e.metadata.clone())
    }

    fn tool_calls_of(&self, id: &MessageId) -> Vec<ToolInvocation> {
        let state = self.state.lock();
        state.branches[&state.active]
            .entries
            .iter()
            .find(|e| &e.message.id == id)
            .map(|e| e.message.tool_calls.clone())
            .unwrap_or_default()
    }

    async fn submit(&self, input: Option<String>, options: SubmitOptions) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        match options.checkpoint {
            Some(ck) => submit_at_checkpoint(&mut state, &ck, input)?,
            None => {
                // Optimistic wholesale replacement of the visible list, used
                // by the degenerate restart-from-scratch path.
                if let Some(messages) = options
                    .optimistic_values
                    .as_ref()
                    .and_then(|v| v.get("messages"))
                    .and_then(|v| v.as_array())
                {
                    let replacement: Vec<Entry> = messages
                        .iter()
                        .filter_map(|m| serde_json::from_value::<ThreadMessage>(m.clone()).ok())
                        .map(|message| Entry {
                            message,
                            metadata: MessageMetadata::default(),
                        })
                        .collect();
                    let active = state.active.clone();
                    if let Some(branch) = state.branches.get_mut(&active) {
                        branch.entries = replacement;
                        branch.resume = None;
                        branch.fork = None;
                    }
                }
                if let Some(text) = input {
                    let active = state.active.clone();
                    append_human(&mut state, &active, ThreadMessage::human(text), None);
                }
            }
        }
        state.generating = true;
        Ok(())
    }

    async fn set_branch(&self, branch: &BranchId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.branches.contains_key(branch) {
            return Err(StoreError::NotFound(format!("branch {branch}")));
        }
        state.active = branch.clone();
        Ok(())
    }

    async fn stop(&self) -> Result<(), StoreError> {
        self.state.lock().generating = false;
        Ok(())
    }
}

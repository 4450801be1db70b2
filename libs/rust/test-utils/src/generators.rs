//! Shared proptest generators for delegated-crypto.

use delegated_crypto::{Discriminator, TaskKind};
use proptest::prelude::*;

/// Generate an arbitrary payload of up to `max_len` bytes.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a payload together with ascending split points inside it.
pub fn chunked_payload_strategy(max_len: usize) -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    payload_strategy(max_len).prop_flat_map(|data| {
        let len = data.len();
        let cuts = prop::collection::vec(0..=len, 0..6).prop_map(|mut cuts| {
            cuts.sort_unstable();
            cuts
        });
        (Just(data), cuts)
    })
}

/// Split `data` at the given ascending cut points.
#[must_use]
pub fn split_at_cuts(data: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &cut in cuts {
        chunks.push(data[start..cut].to_vec());
        start = cut;
    }
    chunks.push(data[start..].to_vec());
    chunks
}

/// Generate a discriminator tag.
pub fn discriminator_strategy() -> impl Strategy<Value = Discriminator> {
    "[a-z]{1,8}-[0-9]{1,4}".prop_map(Discriminator::from)
}

/// One scripted queue submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedTask {
    /// Operation to submit
    pub kind: TaskKind,
    /// Whether the primitive should fail this task
    pub fails: bool,
}

/// Generate a sequence of queue submissions, some of which fail.
pub fn task_script_strategy(max_len: usize) -> impl Strategy<Value = Vec<ScriptedTask>> {
    let task = (
        prop_oneof![
            4 => Just(TaskKind::Update),
            1 => Just(TaskKind::Finalize),
        ],
        prop::bool::weighted(0.2),
    )
        .prop_map(|(kind, fails)| ScriptedTask { kind, fails });
    prop::collection::vec(task, 1..=max_len)
}

/// Indices of the tasks in `script` that are expected to run, given that
/// a failed update discards following updates and the first non-update
/// after them.
#[must_use]
pub fn expected_survivors(script: &[ScriptedTask]) -> Vec<usize> {
    let mut survivors = Vec::new();
    let mut i = 0;
    while i < script.len() {
        survivors.push(i);
        let failed_update = script[i].fails && script[i].kind == TaskKind::Update;
        i += 1;
        if failed_update {
            while i < script.len() && script[i].kind == TaskKind::Update {
                i += 1;
            }
            if i < script.len() {
                i += 1;
            }
        }
    }
    survivors
}

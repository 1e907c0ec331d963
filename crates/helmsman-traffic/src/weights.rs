//! Weight identifiers and the flat ⇄ nested weight map transforms.
//!
//! The flat form is what the DNS collaborator speaks: identifier string
//! to weight. The nested form groups the same values by stack, scope and
//! slot. `flatten(expand(m)) == m` for every well-formed `m`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use helmsman_core::{Scope, Slot, StackIndex};

use crate::error::{TrafficError, TrafficResult};

/// Identifier string → weight percent.
pub type FlatWeights = BTreeMap<String, u8>;

/// stack → scope → slot → weight percent.
pub type NestedWeights = BTreeMap<StackIndex, BTreeMap<Scope, BTreeMap<Slot, u8>>>;

/// Structured form of a weight record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeightId {
    pub stack: StackIndex,
    pub scope: Scope,
    pub slot: Slot,
}

impl WeightId {
    pub fn new(stack: StackIndex, scope: Scope, slot: Slot) -> Self {
        Self { stack, scope, slot }
    }
}

impl fmt::Display for WeightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.stack, self.scope.code(), self.slot.code())
    }
}

impl FromStr for WeightId {
    type Err = TrafficError;

    fn from_str(s: &str) -> TrafficResult<Self> {
        let invalid = || TrafficError::InvalidWeightKey(s.to_string());
        let mut chars = s.chars();
        let (Some(stack), Some(scope), Some(slot), None) =
            (chars.next(), chars.next(), chars.next(), chars.next())
        else {
            return Err(invalid());
        };
        let stack = match stack {
            '0' => StackIndex::Zero,
            '1' => StackIndex::One,
            _ => return Err(invalid()),
        };
        Ok(Self {
            stack,
            scope: Scope::from_code(scope).ok_or_else(invalid)?,
            slot: Slot::from_code(slot).ok_or_else(invalid)?,
        })
    }
}

/// Group a flat identifier map by stack, scope and slot.
pub fn expand(flat: &FlatWeights) -> TrafficResult<NestedWeights> {
    let mut nested = NestedWeights::new();
    for (key, weight) in flat {
        let id: WeightId = key.parse()?;
        nested
            .entry(id.stack)
            .or_default()
            .entry(id.scope)
            .or_default()
            .insert(id.slot, *weight);
    }
    Ok(nested)
}

/// Inverse of [`expand`].
pub fn flatten(nested: &NestedWeights) -> FlatWeights {
    let mut flat = FlatWeights::new();
    for (stack, scopes) in nested {
        for (scope, slots) in scopes {
            for (slot, weight) in slots {
                flat.insert(WeightId::new(*stack, *scope, *slot).to_string(), *weight);
            }
        }
    }
    flat
}

/// The stable/canary weights of one stack and scope. Missing values read
/// as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeightPair {
    pub stable: u8,
    pub canary: u8,
}

impl WeightPair {
    pub fn of(nested: &NestedWeights, stack: StackIndex, scope: Scope) -> Self {
        let slots = nested.get(&stack).and_then(|scopes| scopes.get(&scope));
        let get = |slot: Slot| slots.and_then(|s| s.get(&slot)).copied().unwrap_or(0);
        Self {
            stable: get(Slot::Stable),
            canary: get(Slot::Canary),
        }
    }

    pub fn get(&self, slot: Slot) -> u8 {
        match slot {
            Slot::Stable => self.stable,
            Slot::Canary => self.canary,
        }
    }

    /// Both records at zero: the pair never took part in a rollout.
    pub fn is_unassigned(&self) -> bool {
        self.stable == 0 && self.canary == 0
    }

    /// Whether the at-rest invariant `stable + canary == 100` holds.
    pub fn is_balanced(&self) -> bool {
        u16::from(self.stable) + u16::from(self.canary) == 100
    }
}

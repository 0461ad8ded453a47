//! Append-only history arrays.
//!
//! Every array on a case, approval or batch document follows the same rule:
//! entries are only ever appended, and the last entry is the current state.
//! [`History`] owns that rule so call sites never index the tail by hand.
//!
//! DRC and recovery-officer assignments additionally carry a close stamp. An
//! open entry may be closed exactly once through [`Closable`]; closing never
//! touches an entry that is already closed and never removes anything.

use std::slice::Iter;

use crate::types::TimeStamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History<T> {
    entries: Vec<T>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self { entries: vec![] }
    }
}

impl<T> History<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_first(entry: T) -> Self {
        Self {
            entries: vec![entry],
        }
    }

    pub fn push(&mut self, entry: T) {
        self.entries.push(entry);
    }

    /// The authoritative (current) entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.last()
    }

    /// The entry immediately before the latest one.
    pub fn previous(&self) -> Option<&T> {
        let len = self.entries.len();
        if len < 2 {
            return None;
        }
        self.entries.get(len - 2)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    /// Most recent entry matching `pred`, searching from the tail.
    pub fn latest_where<P>(&self, pred: P) -> Option<&T>
    where
        P: Fn(&T) -> bool,
    {
        self.entries.iter().rev().find(|e| pred(e))
    }
}

/// An assignment entry that stays open until it is stamped closed.
pub trait Closable {
    fn is_open(&self) -> bool;
    fn close(&mut self, by: &str, at: TimeStamp, remark: Option<&str>);
}

impl<T: Closable> History<T> {
    /// The single open entry, if any.
    pub fn current_open(&self) -> Option<&T> {
        self.entries.iter().rev().find(|e| e.is_open())
    }

    pub fn current_open_mut(&mut self) -> Option<&mut T> {
        self.entries.iter_mut().rev().find(|e| e.is_open())
    }

    pub fn open_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_open()).count()
    }

    /// Stamps every open entry closed. Returns how many were closed.
    pub fn close_open(&mut self, by: &str, at: TimeStamp, remark: Option<&str>) -> usize {
        let mut closed = 0;
        for entry in self.entries.iter_mut().filter(|e| e.is_open()) {
            entry.close(by, at, remark);
            closed += 1;
        }
        closed
    }
}

impl<'a, T> IntoIterator for &'a History<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<C, T: minicbor::Encode<C>> minicbor::Encode<C> for History<T> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        minicbor::Encode::encode(&self.entries, e, ctx)
    }
}

impl<'b, C, T: minicbor::Decode<'b, C>> minicbor::Decode<'b, C> for History<T> {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let entries: Vec<T> = minicbor::Decode::decode(d, ctx)?;
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
    struct Slot {
        #[n(0)]
        name: String,
        #[n(1)]
        closed_by: Option<String>,
    }

    impl Closable for Slot {
        fn is_open(&self) -> bool {
            self.closed_by.is_none()
        }
        fn close(&mut self, by: &str, _at: TimeStamp, _remark: Option<&str>) {
            self.closed_by = Some(by.to_string());
        }
    }

    fn slot(name: &str) -> Slot {
        Slot {
            name: name.into(),
            closed_by: None,
        }
    }

    #[test]
    fn latest_and_previous_follow_the_tail() {
        let mut h = History::with_first(1);
        assert_eq!(h.latest(), Some(&1));
        assert_eq!(h.previous(), None);

        h.push(2);
        h.push(3);
        assert_eq!(h.latest(), Some(&3));
        assert_eq!(h.previous(), Some(&2));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn closing_leaves_closed_entries_untouched() {
        let mut h = History::new();
        h.push(slot("a"));
        h.close_open("first", TimeStamp::now(), None);
        h.push(slot("b"));

        assert_eq!(h.close_open("second", TimeStamp::now(), None), 1);
        assert_eq!(h.as_slice()[0].closed_by.as_deref(), Some("first"));
        assert_eq!(h.as_slice()[1].closed_by.as_deref(), Some("second"));
        assert!(h.current_open().is_none());
    }

    #[test]
    fn cbor_encoding_is_a_plain_array() {
        let mut h = History::new();
        h.push(slot("a"));
        h.push(slot("b"));

        let bytes = minicbor::to_vec(&h).unwrap();
        let plain: Vec<Slot> = minicbor::decode(&bytes).unwrap();
        assert_eq!(plain.len(), 2);

        let back: History<Slot> = minicbor::decode(&bytes).unwrap();
        assert_eq!(back, h);
    }
}

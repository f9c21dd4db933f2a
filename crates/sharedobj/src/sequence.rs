//! Sequence and queue operations.

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::kind::Kind;
use crate::object::{Element, SharedObject};
use crate::op::{Op, QueueOp, SeqOp};
use crate::value::{Value, clamp_index};

impl<C: Codec> SharedObject<C> {
    pub fn append(&self, item: impl Into<Value>) -> Result<()> {
        let item = item.into();
        self.write(|inner| {
            inner.require("append", inner.kind.is_sequence())?;
            let item = inner.promote(item)?;
            inner.record(Op::Seq(SeqOp::Append(item)))?;
            Ok(())
        })
    }

    /// Append every item, each as its own record.
    pub fn extend<I, T>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        self.write(|inner| {
            inner.require("extend", inner.kind.is_sequence())?;
            for item in items {
                let item = inner.promote(item)?;
                inner.record(Op::Seq(SeqOp::Append(item)))?;
            }
            Ok(())
        })
    }

    /// Insert before `index`; out-of-range indices clamp to either end.
    pub fn insert(&self, index: i64, item: impl Into<Value>) -> Result<()> {
        let item = item.into();
        self.write(|inner| {
            inner.require("insert", inner.kind.is_sequence())?;
            if let Value::Queue(queue) = &inner.data
                && queue.is_full()
            {
                return Err(Error::QueueFull(queue.len()));
            }
            let item = inner.promote(item)?;
            inner.record(Op::Seq(SeqOp::Insert { index, item }))?;
            Ok(())
        })
    }

    /// Position of the first item equal to `needle` within `start..stop`
    /// (slice bounds: negative values count from the end).
    pub fn index(&self, needle: &Value, start: Option<i64>, stop: Option<i64>) -> Result<usize> {
        self.read(|inner| {
            inner.require("index", inner.kind.is_sequence())?;
            let len = inner.data.container_len().unwrap_or(0);
            let start = start.map_or(0, |i| clamp_index(i, len));
            let stop = stop.map_or(len, |i| clamp_index(i, len));
            inner
                .position_of(needle, start, stop)?
                .ok_or_else(|| Error::ValueNotFound(needle.clone()))
        })
    }

    /// Number of items equal to `needle`.
    pub fn count(&self, needle: &Value) -> Result<usize> {
        self.read(|inner| {
            let items = inner.sequence_items("count")?;
            let mut count = 0;
            for item in items {
                if &inner.resolve(item)? == needle {
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    pub fn reverse(&self) -> Result<()> {
        self.write(|inner| {
            inner.require("reverse", inner.kind.is_sequence())?;
            inner.record(Op::Seq(SeqOp::Reverse))?;
            Ok(())
        })
    }

    /// Sort in place. Sequences holding nested containers cannot be sorted.
    pub fn sort(&self, reverse: bool) -> Result<()> {
        self.write(|inner| {
            inner.require("sort", matches!(inner.kind, Kind::Seq))?;
            inner.record(Op::Seq(SeqOp::Sort { reverse }))?;
            Ok(())
        })
    }

    // -------------------------------------------------------------------------
    // Queue ends
    // -------------------------------------------------------------------------

    /// Push on the left end of a queue, evicting from the right when full.
    pub fn append_left(&self, item: impl Into<Value>) -> Result<()> {
        let item = item.into();
        self.write(|inner| {
            inner.require("append_left", is_queue(&inner.kind))?;
            let item = inner.promote(item)?;
            inner.record(Op::Queue(QueueOp::AppendLeft(item)))?;
            Ok(())
        })
    }

    /// Push every item on the left end, one record each; the result is
    /// in reverse order.
    pub fn extend_left<I, T>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        self.write(|inner| {
            inner.require("extend_left", is_queue(&inner.kind))?;
            for item in items {
                let item = inner.promote(item)?;
                inner.record(Op::Queue(QueueOp::AppendLeft(item)))?;
            }
            Ok(())
        })
    }

    pub fn pop_left(&self) -> Result<Element<C>> {
        self.write(|inner| {
            inner.require("pop_left", is_queue(&inner.kind))?;
            let popped = inner.record(Op::Queue(QueueOp::PopLeft))?;
            inner.element(popped.unwrap_or(Value::Null))
        })
    }

    /// Rotate `n` steps to the right (left when negative).
    pub fn rotate(&self, n: i64) -> Result<()> {
        self.write(|inner| {
            inner.require("rotate", is_queue(&inner.kind))?;
            inner.record(Op::Queue(QueueOp::Rotate(n)))?;
            Ok(())
        })
    }

    /// The bound of a queue, if any.
    pub fn max_len(&self) -> Option<usize> {
        match self.kind() {
            Kind::Queue { max_len } => max_len,
            _ => None,
        }
    }
}

fn is_queue(kind: &Kind) -> bool {
    matches!(kind, Kind::Queue { .. })
}

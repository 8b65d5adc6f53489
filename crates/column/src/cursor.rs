//! Ordered traversal over a column file. Works identically over fixed and
//! variable files through [`crate::file::ColumnFile`]; the backing file
//! chooses how cheaply a step is done via its `PositionHint` (nothing for a
//! fixed file's constant-time arithmetic, a directory page id for a
//! variable file's chain walk).

use hare_common::{ColumnType, HareResult, TupleId};

use crate::file::ColumnFile;

/// A forward/backward cursor over `F`'s tuples, skipping `DELETED` entries.
/// `seek`/`next`/`previous` return whether a live tuple was found; the
/// value at the current position is read again via [`Cursor::get`].
pub struct Cursor<'f, F: ColumnFile<C>, C: ColumnType> {
    file: &'f F,
    position: Option<TupleId>,
    hint: F::PositionHint,
    _value: std::marker::PhantomData<C>,
}

impl<'f, F: ColumnFile<C>, C: ColumnType> Cursor<'f, F, C> {
    pub fn new(file: &'f F) -> Self {
        Self {
            file,
            position: None,
            hint: F::PositionHint::default(),
            _value: std::marker::PhantomData,
        }
    }

    /// The tuple id the cursor currently sits on, if positioned.
    pub fn position(&self) -> Option<TupleId> {
        self.position
    }

    /// Reads the value at the current position, skipping a tombstone
    /// silently (the cursor only ever stops on live tuples).
    pub fn get(&self) -> HareResult<Option<Option<C::Value>>> {
        match self.position {
            None => Ok(None),
            Some(tuple_id) => Ok(Some(self.file.get(tuple_id)?)),
        }
    }

    /// Advances to the next non-deleted tuple in ascending order. `false`
    /// means the end of the file was reached; the cursor is left unpositioned.
    pub fn next(&mut self) -> HareResult<bool> {
        let total = self.file.max_tuple_id()?;
        let Some(max) = total else {
            self.position = None;
            return Ok(false);
        };
        let mut candidate = match self.position {
            Some(p) if p < max => p + 1,
            Some(_) => {
                self.position = None;
                return Ok(false);
            }
            None => 0,
        };
        loop {
            match self.file.get_with_hint(self.hint, candidate) {
                Ok((_, hint)) => {
                    self.hint = hint;
                    self.position = Some(candidate);
                    return Ok(true);
                }
                Err(hare_common::HareError::EntryDeleted(_)) => {
                    if candidate >= max {
                        self.position = None;
                        return Ok(false);
                    }
                    candidate += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Steps to the previous non-deleted tuple in descending order.
    pub fn previous(&mut self) -> HareResult<bool> {
        let mut candidate = match self.position {
            Some(0) | None => {
                self.position = None;
                return Ok(false);
            }
            Some(p) => p - 1,
        };
        loop {
            match self.file.get_with_hint(self.hint, candidate) {
                Ok((_, hint)) => {
                    self.hint = hint;
                    self.position = Some(candidate);
                    return Ok(true);
                }
                Err(hare_common::HareError::EntryDeleted(_)) => {
                    if candidate == 0 {
                        self.position = None;
                        return Ok(false);
                    }
                    candidate -= 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Jumps directly to `tuple_id`. `false` (cursor left unpositioned) if
    /// it is out of bounds or tombstoned.
    pub fn seek(&mut self, tuple_id: TupleId) -> HareResult<bool> {
        match self.file.get_with_hint(self.hint, tuple_id) {
            Ok((_, hint)) => {
                self.hint = hint;
                self.position = Some(tuple_id);
                Ok(true)
            }
            Err(hare_common::HareError::EntryDeleted(_))
            | Err(hare_common::HareError::OutOfBounds(_)) => {
                self.position = None;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Positions at `start` and invokes `action` for every live tuple up to
    /// (exclusive) `end`.
    pub fn for_each(
        &mut self,
        start: TupleId,
        end: TupleId,
        mut action: impl FnMut(TupleId, Option<&C::Value>),
    ) -> HareResult<()> {
        if start >= end || !self.seek(start)? {
            return Ok(());
        }
        loop {
            let Some(tuple_id) = self.position else { break };
            if tuple_id >= end {
                break;
            }
            let value = self.file.get(tuple_id)?;
            action(tuple_id, value.as_ref());
            if !self.next()? {
                break;
            }
        }
        Ok(())
    }

    /// Like [`Cursor::for_each`] but collects `action`'s return value for
    /// every live tuple in `[start, end)`.
    pub fn map<T>(
        &mut self,
        start: TupleId,
        end: TupleId,
        mut action: impl FnMut(TupleId, Option<&C::Value>) -> T,
    ) -> HareResult<Vec<T>> {
        let mut out = Vec::new();
        self.for_each(start, end, |tuple_id, value| out.push(action(tuple_id, value)))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::FixedColumnFile;
    use crate::variable::VariableColumnFile;
    use hare_common::{F64Scalar, F64Vector};
    use hare_storage::EvictionPolicy;
    use tempfile::tempdir;

    #[test]
    fn fixed_cursor_skips_deleted_forward_and_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cur_fixed.hare");
        FixedColumnFile::create(&path, &F64Scalar, false, Some(12)).unwrap();
        let file = FixedColumnFile::open(&path, F64Scalar, false, false, 16, EvictionPolicy::Lru).unwrap();
        for v in [1.0, 2.0, 3.0, 4.0] {
            file.append(Some(&v)).unwrap();
        }
        file.delete(1).unwrap();
        file.commit().unwrap();

        let mut cursor = Cursor::new(&file);
        let mut seen = Vec::new();
        while cursor.next().unwrap() {
            seen.push(cursor.position().unwrap());
        }
        assert_eq!(seen, vec![0, 2, 3]);

        while cursor.previous().unwrap() {
            // drains back to unpositioned
        }
        assert_eq!(cursor.position(), None);
    }

    #[test]
    fn variable_cursor_walks_directory_chain_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cur_var.hare");
        VariableColumnFile::<F64Vector>::create(&path, false, Some(12)).unwrap();
        let file =
            VariableColumnFile::open(&path, F64Vector { dims: 4 }, false, false, 16, EvictionPolicy::Lru)
                .unwrap();
        let ids: Vec<_> = (0..300).map(|i| file.append(Some(&vec![i as f64; 4])).unwrap()).collect();
        file.commit().unwrap();

        let mut cursor = Cursor::new(&file);
        let collected = cursor.map(0, ids.len() as u64, |tuple_id, value| {
            (tuple_id, value.cloned())
        }).unwrap();
        assert_eq!(collected.len(), 300);
        assert_eq!(collected[150], (150, Some(vec![150.0; 4])));
    }

    #[test]
    fn seek_past_max_tuple_id_returns_false_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cur_oob.hare");
        FixedColumnFile::create(&path, &F64Scalar, false, Some(12)).unwrap();
        let file = FixedColumnFile::open(&path, F64Scalar, false, false, 16, EvictionPolicy::Lru).unwrap();
        file.append(Some(&1.0)).unwrap();
        file.commit().unwrap();

        let mut cursor = Cursor::new(&file);
        assert_eq!(cursor.seek(5).unwrap(), false);
        assert_eq!(cursor.position(), None);

        // A `for_each` starting past the end must yield an empty iteration,
        // not propagate `OutOfBounds`.
        let mut seen = Vec::new();
        cursor.for_each(5, 10, |tuple_id, _| seen.push(tuple_id)).unwrap();
        assert!(seen.is_empty());
    }
}

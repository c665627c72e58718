use crate::context::DynamicContext;
use crate::error::{Error, ErrorCode, Result};
use crate::value::{Atomic, Item};

/// A lazy, single-pass stream of dynamic contexts. Errors raised while
/// streaming surface as `Err` items and abort the query; upstream
/// operators that need exact sizes materialise explicitly.
pub struct Sequence<'d> {
    iter: Box<dyn Iterator<Item = Result<DynamicContext<'d>>> + 'd>,
}

impl<'d> Sequence<'d> {
    pub fn empty() -> Sequence<'d> {
        Sequence {
            iter: Box::new(std::iter::empty()),
        }
    }

    pub fn once(ctx: DynamicContext<'d>) -> Sequence<'d> {
        Sequence {
            iter: Box::new(std::iter::once(Ok(ctx))),
        }
    }

    /// A stream over already-scoped contexts.
    pub fn from_contexts(contexts: Vec<DynamicContext<'d>>) -> Sequence<'d> {
        Sequence {
            iter: Box::new(contexts.into_iter().map(Ok)),
        }
    }

    pub fn from_iter(
        iter: impl Iterator<Item = Result<DynamicContext<'d>>> + 'd,
    ) -> Sequence<'d> {
        Sequence {
            iter: Box::new(iter),
        }
    }

    /// Collect the whole stream, propagating the first error.
    pub fn materialize(self) -> Result<Vec<DynamicContext<'d>>> {
        self.iter.collect()
    }

    pub fn materialize_items(self) -> Result<Vec<Item<'d>>> {
        self.iter.map(|r| r.map(|ctx| ctx.item)).collect()
    }

    /// Pull at most two contexts. Returns a restartable stream together
    /// with the first context iff the stream holds exactly one; a longer
    /// stream yields `None` without being consumed further.
    pub fn peek_one(mut self) -> Result<(Sequence<'d>, Option<DynamicContext<'d>>)> {
        let Some(first) = self.iter.next().transpose()? else {
            return Ok((Sequence::empty(), None));
        };

        match self.iter.next().transpose()? {
            None => Ok((Sequence::once(first.clone()), Some(first))),
            Some(second) => {
                let rest = vec![Ok(first), Ok(second)].into_iter().chain(self.iter);

                Ok((Sequence::from_iter(rest), None))
            }
        }
    }
}

impl<'d> Iterator for Sequence<'d> {
    type Item = Result<DynamicContext<'d>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Renumber a materialised sequence: positions 1..=N, exact size.
pub fn rescope(mut contexts: Vec<DynamicContext<'_>>) -> Vec<DynamicContext<'_>> {
    let size = contexts.len();

    for (index, ctx) in contexts.iter_mut().enumerate() {
        ctx.position = index + 1;
        ctx.size = Some(size);
    }

    contexts
}

/// Renumber lazily; the size stays unknown while streaming.
pub fn rescope_streaming(seq: Sequence<'_>) -> Sequence<'_> {
    Sequence::from_iter(seq.enumerate().map(|(index, result)| {
        result.map(|mut ctx| {
            ctx.position = index + 1;
            ctx.size = None;
            ctx
        })
    }))
}

/// Effective boolean value of a stream: empty is false, a leading node is
/// true, a single atomic reduces by type, anything else is a type error.
pub fn effective_boolean(mut seq: Sequence<'_>) -> Result<bool> {
    let Some(first) = seq.next().transpose()? else {
        return Ok(false);
    };

    if first.item.is_node() {
        return Ok(true);
    }

    if seq.next().transpose()?.is_some() {
        return Err(Error::eval(
            ErrorCode::XPTY0004,
            "effective boolean value of a sequence of more than one atomic",
        ));
    }

    Ok(atomic_boolean(first.item.as_atomic().expect("non-node item")))
}

/// Effective boolean value over materialised items, for function
/// arguments.
pub fn effective_boolean_items(items: &[Item<'_>]) -> Result<bool> {
    let Some(first) = items.first() else {
        return Ok(false);
    };

    if first.is_node() {
        return Ok(true);
    }

    if items.len() > 1 {
        return Err(Error::eval(
            ErrorCode::XPTY0004,
            "effective boolean value of a sequence of more than one atomic",
        ));
    }

    Ok(atomic_boolean(first.as_atomic().expect("non-node item")))
}

fn atomic_boolean(atomic: &Atomic) -> bool {
    match atomic {
        Atomic::Boolean(v) => *v,
        Atomic::Str(v) => !v.is_empty(),
        Atomic::Integer(v) => *v != 0,
        Atomic::Double(v) => !(*v == 0.0 || v.is_nan()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use std::rc::Rc;

    fn atomic_ctx(atomic: Atomic) -> DynamicContext<'static> {
        DynamicContext::new(Item::Atomic(atomic), Rc::new(StaticContext::default()))
    }

    fn seq_of(atomics: Vec<Atomic>) -> Sequence<'static> {
        Sequence::from_contexts(atomics.into_iter().map(atomic_ctx).collect())
    }

    #[test]
    fn peek_one_distinguishes_cardinality() {
        let (rest, single) = seq_of(vec![]).peek_one().unwrap();
        assert!(single.is_none());
        assert_eq!(rest.materialize().unwrap().len(), 0);

        let (rest, single) = seq_of(vec![Atomic::Integer(1)]).peek_one().unwrap();
        assert_eq!(
            single.map(|c| c.item),
            Some(Item::Atomic(Atomic::Integer(1)))
        );
        assert_eq!(rest.materialize().unwrap().len(), 1);

        let (rest, single) = seq_of(vec![Atomic::Integer(1), Atomic::Integer(2)])
            .peek_one()
            .unwrap();
        assert!(single.is_none());
        assert_eq!(rest.materialize().unwrap().len(), 2);
    }

    #[test]
    fn rescope_renumbers_materialised_sequences() {
        let contexts = vec![
            atomic_ctx(Atomic::Integer(10)),
            atomic_ctx(Atomic::Integer(20)),
            atomic_ctx(Atomic::Integer(30)),
        ];

        let scoped = rescope(contexts);

        for (index, ctx) in scoped.iter().enumerate() {
            assert_eq!(ctx.position, index + 1);
            assert_eq!(ctx.size, Some(3));
        }
    }

    #[test]
    fn rescope_streaming_leaves_size_unknown() {
        let scoped = rescope_streaming(seq_of(vec![Atomic::Integer(10), Atomic::Integer(20)]))
            .materialize()
            .unwrap();

        assert_eq!(scoped[0].position, 1);
        assert_eq!(scoped[1].position, 2);
        assert!(scoped.iter().all(|c| c.size.is_none()));
    }

    #[test]
    fn effective_boolean_table() {
        // empty
        assert!(!effective_boolean(Sequence::empty()).unwrap());

        // single atomics
        for (atomic, expected) in [
            (Atomic::Boolean(true), true),
            (Atomic::Boolean(false), false),
            (Atomic::Str(String::new()), false),
            (Atomic::Str("x".to_string()), true),
            (Atomic::Integer(0), false),
            (Atomic::Integer(1), true),
            (Atomic::Integer(-1), true),
            (Atomic::Double(0.0), false),
            (Atomic::Double(f64::NAN), false),
            (Atomic::Double(0.5), true),
        ] {
            assert_eq!(
                effective_boolean(seq_of(vec![atomic.clone()])).unwrap(),
                expected,
                "EBV of {atomic:?}"
            );
        }

        // more than one atomic is a type error
        let err =
            effective_boolean(seq_of(vec![Atomic::Integer(1), Atomic::Integer(2)])).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::XPTY0004);
    }
}

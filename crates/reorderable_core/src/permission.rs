//! Edit permission seam consumed by the reorder engine.
//!
//! The policy itself belongs to the caller; the engine only asks, before any
//! write, whether `actor` may reposition `record`.

use crate::model::record::RankedRecord;
use std::marker::PhantomData;

/// Caller-supplied edit check.
pub trait EditPermission {
    type Actor: ?Sized;

    fn can_edit(&self, actor: &Self::Actor, record: &RankedRecord) -> bool;
}

/// Permits every edit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl EditPermission for AllowAll {
    type Actor = ();

    fn can_edit(&self, _actor: &(), _record: &RankedRecord) -> bool {
        true
    }
}

/// Adapts a closure into an `EditPermission`.
pub struct PermissionFn<A: ?Sized, F> {
    check: F,
    _actor: PhantomData<fn(&A)>,
}

impl<A: ?Sized, F> EditPermission for PermissionFn<A, F>
where
    F: Fn(&A, &RankedRecord) -> bool,
{
    type Actor = A;

    fn can_edit(&self, actor: &A, record: &RankedRecord) -> bool {
        (self.check)(actor, record)
    }
}

pub fn permission_fn<A: ?Sized, F>(check: F) -> PermissionFn<A, F>
where
    F: Fn(&A, &RankedRecord) -> bool,
{
    PermissionFn {
        check,
        _actor: PhantomData,
    }
}

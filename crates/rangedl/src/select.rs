use crate::{
    error::{RangedlError, RangedlResult},
    manifest::{TrackKind, Variant},
};

/// Pick the variant with the highest quality attribute of `kind`.
///
/// Variants with equal quality keep their playlist order, so the first one wins.
pub fn select_best(variants: &[Variant], kind: TrackKind) -> RangedlResult<&Variant> {
    let key = kind.quality_key();
    variants
        .iter()
        .reduce(|best, variant| {
            if variant.quality(key) > best.quality(key) {
                variant
            } else {
                best
            }
        })
        .ok_or(RangedlError::EmptyVariantList(kind))
}

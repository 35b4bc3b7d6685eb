use crate::{
    batch::{BatchReport, BatchScheduler, Throttle},
    error::ReftreeError,
    locator::{entry_id_from_urn, EntryLocator},
    properties::{AssetRecord, LinkDescriptor, LinkKind, ResolvedEntry},
    source::ContentSource,
};

/// Resolve one reference to the entry it names.
///
/// Internal links are looked up by id. External links are looked up through their locator when
/// it parses, otherwise by the locator's final path segment. Any failure surfaces as
/// [`ReftreeError::NotFound`] or [`ReftreeError::Transport`]; nothing is retried.
#[tracing::instrument(skip(source), fields(target = %descriptor.target_id))]
pub async fn resolve<S: ContentSource>(
    source: &S,
    descriptor: &LinkDescriptor,
) -> Result<ResolvedEntry, ReftreeError> {
    let result = match (descriptor.kind, &descriptor.locator) {
        (LinkKind::ExternalUrn, Some(urn)) => match EntryLocator::parse(urn) {
            Ok(locator) => source.get_entry_at(&locator).await,
            Err(_) => source.get_entry(entry_id_from_urn(urn)).await,
        },
        _ => source.get_entry(&descriptor.target_id).await,
    };
    result.map_err(|e| match e {
        ReftreeError::NotFound(_) | ReftreeError::Transport(_) => e,
        other => ReftreeError::Transport(format!("{descriptor}: {other}")),
    })
}

/// Resolve a list of references through `scheduler`, keeping per-item failures in the report.
pub async fn resolve_all<S: ContentSource, T: Throttle>(
    scheduler: &mut BatchScheduler<T>,
    source: &S,
    descriptors: &[LinkDescriptor],
) -> BatchReport<LinkDescriptor> {
    scheduler
        .fetch_in_batches(descriptors, |d| resolve(source, d))
        .await
}

/// The entry's first linked image, or `None` if it has none or the lookup fails.
pub async fn resolve_image<S: ContentSource>(
    source: &S,
    entry: &ResolvedEntry,
    locale: &str,
) -> Option<AssetRecord> {
    let asset_id = entry.image_asset_id(locale)?;
    match source.get_asset(asset_id).await {
        Ok(asset) => Some(asset),
        Err(e) => {
            tracing::warn!("Error fetching image asset {asset_id} for {}: {e}", entry.id);
            None
        }
    }
}

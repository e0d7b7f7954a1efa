use crate::model::ContentItem;

/// Order content canonically: by kind (video, reading, practice, quiz,
/// assessment, then anything else), then shorter first, then easier first,
/// then by id. Keeps at most `limit` items when a limit is given.
pub fn rank_content(mut items: Vec<ContentItem>, limit: Option<usize>) -> Vec<ContentItem> {
    items.sort_by(|a, b| {
        a.kind
            .rank()
            .cmp(&b.kind.rank())
            .then(a.est_minutes.cmp(&b.est_minutes))
            .then(a.difficulty.cmp(&b.difficulty))
            .then_with(|| a.id.cmp(&b.id))
    });
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}

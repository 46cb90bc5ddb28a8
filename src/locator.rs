//! Chapter-to-page lookup.

/// Index of the page containing `chapter_start`: the last page whose start
/// offset is at or before it.
///
/// `page_offsets` must be ascending, as produced by pagination. When it is
/// empty (pagination has not run yet) the last of `available_pages` is
/// returned, or 0.
///
/// ```
/// use vellum::locator::page_index_for_chapter;
///
/// let offsets = [0, 2000, 4000];
/// assert_eq!(page_index_for_chapter(0, &offsets, 3), 0);
/// assert_eq!(page_index_for_chapter(2000, &offsets, 3), 1);
/// assert_eq!(page_index_for_chapter(3999, &offsets, 3), 1);
/// assert_eq!(page_index_for_chapter(9000, &offsets, 3), 2);
/// ```
pub fn page_index_for_chapter(chapter_start: usize, page_offsets: &[usize], available_pages: usize) -> usize {
    if page_offsets.is_empty() {
        return available_pages.saturating_sub(1);
    }
    page_offsets
        .partition_point(|&offset| offset <= chapter_start)
        .saturating_sub(1)
}

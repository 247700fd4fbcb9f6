use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSlot {
    Page(usize),
    Ellipsis,
}

impl fmt::Display for PageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSlot::Page(number) => write!(f, "{number}"),
            PageSlot::Ellipsis => f.write_str("…"),
        }
    }
}

pub fn total_pages(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size.max(1))
}

/// Page buttons around `current`: first, last, and a window of two on each
/// side, with a marker standing in for each skipped run.
pub fn layout_page_numbers(current: usize, total: usize) -> Vec<PageSlot> {
    if total <= 1 {
        return Vec::new();
    }
    let current = current as isize;
    let mut slots = Vec::new();
    for page in 1..=total {
        let distance = page as isize - current;
        if page == 1 || page == total || distance.abs() <= 2 {
            slots.push(PageSlot::Page(page));
        } else if distance.abs() == 3 {
            slots.push(PageSlot::Ellipsis);
        }
    }
    slots
}

pub fn render_slots(slots: &[PageSlot], current: usize) -> String {
    slots
        .iter()
        .map(|slot| match slot {
            PageSlot::Page(number) if *number == current => format!("[{number}]"),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

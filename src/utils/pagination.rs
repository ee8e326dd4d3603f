use serde::Serialize;

/// Page window resolved from optional `page` / `per_page` query values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageWindow {
    pub page: u32,
    pub per_page: u32,
}

impl PageWindow {
    pub fn new(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_per_page).clamp(1, 100),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

#[derive(Serialize)]
pub struct Paginated<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, window: PageWindow, total: i64) -> Self {
        Self {
            success: true,
            data,
            page: window.page,
            per_page: window.per_page,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let w = PageWindow::new(None, None, 20);
        assert_eq!(w, PageWindow { page: 1, per_page: 20 });
        assert_eq!(w.offset(), 0);

        let w = PageWindow::new(Some(0), Some(1000), 20);
        assert_eq!(w.page, 1);
        assert_eq!(w.per_page, 100);

        let w = PageWindow::new(Some(3), Some(0), 20);
        assert_eq!(w.per_page, 1);
        assert_eq!(w.offset(), 2);
    }

    #[test]
    fn offset_follows_page() {
        let w = PageWindow::new(Some(4), Some(25), 10);
        assert_eq!(w.limit(), 25);
        assert_eq!(w.offset(), 75);
    }
}

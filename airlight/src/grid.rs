use std::ops::{Index, IndexMut};

/// Row-major 2D buffer addressed as `(x, y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    values: Vec<T>,
    width: usize,
    height: usize,
}

impl<T> Grid<T> {
    /// `values.len()` must equal `width * height`; callers validate first.
    pub fn new(width: usize, height: usize, values: Vec<T>) -> Self {
        debug_assert_eq!(
            values.len(),
            width * height,
            "values length must equal width * height"
        );
        Self {
            values,
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.values[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.values
    }
}

impl<T: Clone> Grid<T> {
    pub fn new_filled(width: usize, height: usize, value: T) -> Self {
        Self {
            values: vec![value; width * height],
            width,
            height,
        }
    }
}

impl<T> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        debug_assert!(x < self.width && y < self.height);
        &self.values[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        debug_assert!(x < self.width && y < self.height);
        &mut self.values[y * self.width + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_row_major() {
        let grid = Grid::new(3, 2, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(grid[(0, 0)], 0);
        assert_eq!(grid[(2, 0)], 2);
        assert_eq!(grid[(1, 1)], 4);
        assert_eq!(grid.row(1), &[3, 4, 5]);
    }

    #[test]
    fn test_index_mut() {
        let mut grid = Grid::new_filled(2, 2, 0.0f32);
        grid[(1, 0)] = 3.5;
        assert_eq!(grid.values(), &[0.0, 3.5, 0.0, 0.0]);
        assert_eq!(grid.into_vec().len(), 4);
    }
}

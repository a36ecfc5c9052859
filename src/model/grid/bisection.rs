/*
Copyright 2022 Jakub Lewandowski

This file is part of Trajectory Interpolation Grids (TIG).

Trajectory Interpolation Grids (TIG) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Trajectory Interpolation Grids (TIG) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Trajectory Interpolation Grids (TIG). If not, see https://www.gnu.org/licenses/.
*/

//! Module containg methods for conducting
//! binary search (bisection) of elements closests
//! to searched values on monotonic grid axes.

use crate::errors::SearchError;

/// Core bisection function, simply an implementation
/// of binary search algorithm adapted to searching values
/// in-between the set items.
///
/// Works for axes sorted both ascendingly and descendingly.
fn binary_search<T: PartialOrd>(array: &[T], x: &T) -> Result<usize, SearchError> {
    let (first, last) = match (array.first(), array.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(SearchError::EmptyArray),
    };

    if x < first && x < last || x > first && x > last {
        return Err(SearchError::OutOfBounds);
    }

    let mut lo = 0;
    let mut hi = array.len() - 1;

    // if the array is sorted descendingly we use a function with reversed signs
    if first < last {
        while lo < hi {
            let mid = (lo + hi) / 2;

            if array[mid] >= *x {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
    } else {
        while lo < hi {
            let mid = (lo + hi) / 2;

            if array[mid] <= *x {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
    }

    Ok(lo)
}

/// Finds the index of the axis element closest to the searched value
/// from the side of the axis beginning (the element equal to the searched
/// value counts as closest).
pub fn find_left_closest<T: PartialOrd>(array: &[T], x: &T) -> Result<usize, SearchError> {
    let found_index = binary_search(array, x)?;

    let ascending = array[0] < array[array.len() - 1];

    if (ascending && array[found_index] <= *x) || (!ascending && array[found_index] >= *x) {
        Ok(found_index)
    } else {
        Ok(found_index - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::find_left_closest;
    use crate::errors::SearchError;

    #[test]
    fn ascending_axis() {
        let axis = [-90.0, -30.0, 30.0, 90.0];

        assert_eq!(find_left_closest(&axis, &0.0), Ok(1));
        assert_eq!(find_left_closest(&axis, &-90.0), Ok(0));
        assert_eq!(find_left_closest(&axis, &30.0), Ok(2));
        assert_eq!(find_left_closest(&axis, &90.0), Ok(3));
        assert_eq!(find_left_closest(&axis, &95.0), Err(SearchError::OutOfBounds));
    }

    #[test]
    fn descending_axis() {
        let axis = [1000.0, 850.0, 500.0, 250.0];

        assert_eq!(find_left_closest(&axis, &900.0), Ok(0));
        assert_eq!(find_left_closest(&axis, &500.0), Ok(2));
        assert_eq!(find_left_closest(&axis, &300.0), Ok(2));
        assert_eq!(find_left_closest(&axis, &100.0), Err(SearchError::OutOfBounds));
    }

    #[test]
    fn empty_axis() {
        let axis: [f64; 0] = [];
        assert_eq!(find_left_closest(&axis, &1.0), Err(SearchError::EmptyArray));
    }
}

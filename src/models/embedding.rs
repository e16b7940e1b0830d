use std::io::Cursor;

use ndarray::{Array2, Axis};
use ndarray_npy::{ReadNpyError, ReadNpyExt};

use super::ArticleId;
use crate::error::{AppError, AppResult};

/// Header descriptor of arrays holding pickled Python objects
const OBJECT_DESCR: &str = "'|O'";

fn object_array_error() -> AppError {
    AppError::DataUnavailable(
        "embeddings: array of pickled objects ('|O'), save it with a float dtype".to_string(),
    )
}

/// 2D article embeddings, one row per article id
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    points: Array2<f64>,
}

impl EmbeddingTable {
    pub fn new(points: Array2<f64>) -> AppResult<Self> {
        if points.ncols() < 2 {
            return Err(AppError::DataUnavailable(format!(
                "embeddings: expected 2 columns, found {}",
                points.ncols()
            )));
        }
        Ok(Self { points })
    }

    /// Parses a `.npy` array of `f8` or `f4` values
    pub fn from_npy(data: &[u8]) -> AppResult<Self> {
        let points = match Array2::<f64>::read_npy(Cursor::new(data)) {
            Ok(points) => points,
            Err(ReadNpyError::WrongDescriptor(descr)) if descr.to_string() == OBJECT_DESCR => {
                return Err(object_array_error());
            }
            Err(ReadNpyError::WrongDescriptor(_)) => Array2::<f32>::read_npy(Cursor::new(data))
                .map(|points| points.mapv(f64::from))
                .map_err(|e| AppError::DataUnavailable(format!("embeddings: {}", e)))?,
            Err(e) => return Err(AppError::DataUnavailable(format!("embeddings: {}", e))),
        };

        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Coordinates of one article
    pub fn point(&self, article_id: ArticleId) -> AppResult<(f64, f64)> {
        let row = usize::try_from(article_id)
            .ok()
            .filter(|row| *row < self.points.nrows())
            .ok_or_else(|| {
                AppError::DataUnavailable(format!(
                    "embeddings: article {} outside of {} rows",
                    article_id,
                    self.points.nrows()
                ))
            })?;

        Ok((self.points[[row, 0]], self.points[[row, 1]]))
    }

    /// Coordinates of several articles, in the given order
    pub fn points_for(&self, article_ids: &[ArticleId]) -> AppResult<Vec<(f64, f64)>> {
        article_ids.iter().map(|id| self.point(*id)).collect()
    }

    /// Every article's coordinates, in row order
    pub fn all_points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.axis_iter(Axis(0)).map(|row| (row[0], row[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_npy::WriteNpyExt;

    #[test]
    fn test_from_npy_f64() {
        let mut data = Vec::new();
        array![[0.0f64, 1.0], [2.5, -3.0]].write_npy(&mut data).unwrap();

        let table = EmbeddingTable::from_npy(&data).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.point(1).unwrap(), (2.5, -3.0));
    }

    #[test]
    fn test_from_npy_f32_is_widened() {
        let mut data = Vec::new();
        array![[0.5f32, 1.5], [2.0, 4.0], [8.0, 16.0]]
            .write_npy(&mut data)
            .unwrap();

        let table = EmbeddingTable::from_npy(&data).unwrap();

        assert_eq!(table.points_for(&[2, 0]).unwrap(), vec![(8.0, 16.0), (0.5, 1.5)]);
        assert_eq!(table.all_points().count(), 3);
    }

    #[test]
    fn test_out_of_range_article_is_an_error() {
        let table = EmbeddingTable::new(array![[0.0, 0.0]]).unwrap();
        assert!(matches!(table.point(5), Err(AppError::DataUnavailable(_))));
    }

    #[test]
    fn test_rejects_single_column() {
        assert!(EmbeddingTable::new(array![[1.0], [2.0]]).is_err());
    }

    fn npy_v1(header: &str, body: &[u8]) -> Vec<u8> {
        let mut dict = header.to_string();
        while (10 + dict.len() + 1) % 64 != 0 {
            dict.push(' ');
        }
        dict.push('\n');

        let mut data = b"\x93NUMPY\x01\x00".to_vec();
        data.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        data.extend_from_slice(dict.as_bytes());
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn test_handwritten_header_f8() {
        let body: Vec<u8> = [1.0f64, 2.0, 3.0, 4.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let data = npy_v1(
            "{'descr': '<f8', 'fortran_order': False, 'shape': (2, 2), }",
            &body,
        );

        let table = EmbeddingTable::from_npy(&data).unwrap();
        assert_eq!(table.point(1).unwrap(), (3.0, 4.0));
    }

    #[test]
    fn test_object_array_is_a_named_data_error() {
        // Pickle payload of an object array; never decoded.
        let data = npy_v1(
            "{'descr': '|O', 'fortran_order': False, 'shape': (2, 2), }",
            b"\x80\x03cnumpy.core.multiarray\n_reconstruct\nq\x00.",
        );

        match EmbeddingTable::from_npy(&data) {
            Err(AppError::DataUnavailable(detail)) => {
                assert!(detail.contains("pickled objects"), "{detail}");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(EmbeddingTable::from_npy(b"\x93NUMPY garbage").is_err());
    }
}

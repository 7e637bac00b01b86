//! The shape of the tensor (channel) dimension of a pixel.
use std::fmt;

use crate::error::{messages, Error, Result};

/// How the elements of a tensor are arranged in storage.
///
/// A column-major matrix is stored as follows:
///
/// ```text
/// |0 3 6|
/// |1 4 7|
/// |2 5 8|
/// ```
///
/// A row-major matrix is its transpose. Both always have more than one row and column, a tensor
/// with only one row or one column is a vector.
///
/// Symmetric and triangular matrices store the diagonal first, then the upper triangle column by
/// column. A lower triangular matrix is the transpose of an upper triangular one.
///
/// ```text
/// |0 4 5 7|
/// |x 1 6 8|
/// |x x 2 9|
/// |x x x 3|
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TensorShape {
    #[default]
    ColumnVector,
    RowVector,
    ColumnMajorMatrix,
    RowMajorMatrix,
    DiagonalMatrix,
    SymmetricMatrix,
    UpperTriangularMatrix,
    LowerTriangularMatrix,
}

/// Describes the tensor of each pixel, without holding any data.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tensor {
    shape: TensorShape,
    elements: usize,
    rows: usize,
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor::scalar()
    }
}

impl Tensor {
    /// A single element.
    pub const fn scalar() -> Self {
        Tensor {
            shape: TensorShape::ColumnVector,
            elements: 1,
            rows: 1,
        }
    }

    /// A column vector of `n` elements.
    pub const fn vector(n: usize) -> Self {
        Tensor {
            shape: TensorShape::ColumnVector,
            elements: n,
            rows: n,
        }
    }

    /// A full matrix, stored column-major. Degenerate matrices become vectors.
    pub const fn matrix(rows: usize, columns: usize) -> Self {
        if columns == 1 {
            Tensor::vector(rows)
        } else if rows == 1 {
            Tensor {
                shape: TensorShape::RowVector,
                elements: columns,
                rows: 1,
            }
        } else {
            Tensor {
                shape: TensorShape::ColumnMajorMatrix,
                elements: rows * columns,
                rows,
            }
        }
    }

    /// A tensor of an explicit shape.
    ///
    /// Diagonal, symmetric and triangular shapes require a square matrix. Full matrices with a
    /// single row or column collapse to vectors.
    pub fn with_shape(shape: TensorShape, rows: usize, columns: usize) -> Result<Self> {
        if rows == 0 || columns == 0 {
            return Err(Error::parameter(messages::ZERO_SIZE));
        }

        let square = |elements: usize| {
            if rows == columns {
                Ok(Tensor {
                    shape,
                    elements,
                    rows,
                })
            } else {
                Err(Error::parameter("tensor shape requires a square matrix"))
            }
        };

        match shape {
            TensorShape::ColumnVector if columns == 1 => Ok(Tensor::vector(rows)),
            TensorShape::RowVector if rows == 1 => Ok(Tensor::matrix(1, columns)),
            TensorShape::ColumnVector | TensorShape::RowVector => {
                Err(Error::parameter("a vector has a single row or column"))
            }
            TensorShape::ColumnMajorMatrix => Ok(Tensor::matrix(rows, columns)),
            TensorShape::RowMajorMatrix => Ok(match Tensor::matrix(rows, columns) {
                Tensor {
                    shape: TensorShape::ColumnMajorMatrix,
                    elements,
                    ..
                } => Tensor {
                    shape,
                    elements,
                    rows,
                },
                vector => vector,
            }),
            TensorShape::DiagonalMatrix => square(rows),
            TensorShape::SymmetricMatrix
            | TensorShape::UpperTriangularMatrix
            | TensorShape::LowerTriangularMatrix => square(rows * (rows + 1) / 2),
        }
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    /// The number of stored elements.
    pub fn elements(&self) -> usize {
        self.elements
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        match self.shape {
            TensorShape::ColumnVector => 1,
            TensorShape::RowVector => self.elements,
            TensorShape::ColumnMajorMatrix | TensorShape::RowMajorMatrix => {
                self.elements / self.rows
            }
            _ => self.rows,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.elements == 1
    }

    pub fn is_vector(&self) -> bool {
        !self.is_scalar()
            && matches!(
                self.shape,
                TensorShape::ColumnVector | TensorShape::RowVector
            )
    }

    pub fn is_square(&self) -> bool {
        self.rows() == self.columns()
    }

    pub fn is_symmetric(&self) -> bool {
        self.is_scalar() || self.shape == TensorShape::SymmetricMatrix
    }

    /// The storage index of element `(row, column)`.
    ///
    /// `None` if the element is out of bounds or not stored, as the zero elements of diagonal and
    /// triangular matrices. For symmetric matrices both halves map to the stored upper triangle.
    pub fn index(&self, row: usize, column: usize) -> Option<usize> {
        let (m, n) = (self.rows(), self.columns());
        if row >= m || column >= n {
            return None;
        }

        let upper = |i: usize, j: usize| {
            // Diagonal first, then the upper triangle column-wise.
            if i == j {
                i
            } else {
                m + j * (j - 1) / 2 + i
            }
        };

        match self.shape {
            TensorShape::ColumnVector => Some(row),
            TensorShape::RowVector => Some(column),
            TensorShape::ColumnMajorMatrix => Some(row + column * m),
            TensorShape::RowMajorMatrix => Some(column + row * n),
            TensorShape::DiagonalMatrix => (row == column).then_some(row),
            TensorShape::SymmetricMatrix => {
                Some(upper(row.min(column), row.max(column)))
            }
            TensorShape::UpperTriangularMatrix => (row <= column).then(|| upper(row, column)),
            TensorShape::LowerTriangularMatrix => (row >= column).then(|| upper(column, row)),
        }
    }

    /// A table mapping every element of the full matrix, column-major, to its storage index.
    pub fn look_up_table(&self) -> Vec<Option<usize>> {
        let (m, n) = (self.rows(), self.columns());
        (0..n)
            .flat_map(|column| (0..m).map(move |row| (row, column)))
            .map(|(row, column)| self.index(row, column))
            .collect()
    }

    /// The transposed tensor, referring to the same storage.
    pub fn transpose(&self) -> Self {
        let (shape, rows) = match self.shape {
            TensorShape::ColumnVector => (TensorShape::RowVector, 1),
            TensorShape::RowVector => (TensorShape::ColumnVector, self.elements),
            TensorShape::ColumnMajorMatrix => (TensorShape::RowMajorMatrix, self.columns()),
            TensorShape::RowMajorMatrix => (TensorShape::ColumnMajorMatrix, self.columns()),
            TensorShape::UpperTriangularMatrix => (TensorShape::LowerTriangularMatrix, self.rows),
            TensorShape::LowerTriangularMatrix => (TensorShape::UpperTriangularMatrix, self.rows),
            other => (other, self.rows),
        };

        if self.is_scalar() {
            return *self;
        }

        Tensor {
            shape,
            elements: self.elements,
            rows,
        }
    }

    /// The stored diagonal, as a number of elements and the step between them in storage.
    pub fn diagonal_elements(&self) -> (usize, usize) {
        let len = self.rows().min(self.columns());
        let step = match self.shape {
            TensorShape::ColumnMajorMatrix => self.rows + 1,
            TensorShape::RowMajorMatrix => self.columns() + 1,
            _ => 1,
        };
        (len, step)
    }

    /// Reinterpret the stored elements as a column-major matrix of another shape.
    ///
    /// Only valid for tensors whose storage is column-major already: vectors and column-major
    /// matrices.
    pub fn reshape(&self, rows: usize, columns: usize) -> Result<Self> {
        if rows * columns != self.elements {
            return Err(Error::parameter(messages::TENSOR_ELEMENTS_DONT_MATCH));
        }

        match self.shape {
            TensorShape::ColumnVector
            | TensorShape::RowVector
            | TensorShape::ColumnMajorMatrix => Ok(Tensor::matrix(rows, columns)),
            _ => Err(Error::parameter(
                "only vectors and column-major matrices can be reshaped",
            )),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor({:?}, {}x{})",
            self.shape,
            self.rows(),
            self.columns()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Tensor, TensorShape};

    #[test]
    fn element_counts() {
        let cases = [
            (TensorShape::ColumnMajorMatrix, 3, 2, 6),
            (TensorShape::RowMajorMatrix, 2, 3, 6),
            (TensorShape::DiagonalMatrix, 3, 3, 3),
            (TensorShape::SymmetricMatrix, 3, 3, 6),
            (TensorShape::UpperTriangularMatrix, 4, 4, 10),
            (TensorShape::LowerTriangularMatrix, 2, 2, 3),
        ];

        for (shape, rows, columns, elements) in cases {
            let tensor = Tensor::with_shape(shape, rows, columns).unwrap();
            assert_eq!(tensor.elements(), elements, "{shape:?}");
            assert_eq!(tensor.rows(), rows);
            assert_eq!(tensor.columns(), columns);
        }

        assert!(Tensor::with_shape(TensorShape::SymmetricMatrix, 2, 3).is_err());
        assert_eq!(
            Tensor::with_shape(TensorShape::ColumnMajorMatrix, 1, 4)
                .unwrap()
                .shape(),
            TensorShape::RowVector
        );
    }

    #[test]
    fn symmetric_storage_order() {
        let tensor = Tensor::with_shape(TensorShape::SymmetricMatrix, 4, 4).unwrap();
        assert_eq!(tensor.index(0, 0), Some(0));
        assert_eq!(tensor.index(3, 3), Some(3));
        assert_eq!(tensor.index(0, 1), Some(4));
        assert_eq!(tensor.index(0, 2), Some(5));
        assert_eq!(tensor.index(1, 2), Some(6));
        assert_eq!(tensor.index(2, 3), Some(9));
        // The lower half reads the upper half.
        assert_eq!(tensor.index(3, 2), Some(9));
    }

    #[test]
    fn triangular_and_diagonal_omit_zeros() {
        let upper = Tensor::with_shape(TensorShape::UpperTriangularMatrix, 3, 3).unwrap();
        assert_eq!(upper.index(1, 0), None);
        assert_eq!(upper.index(0, 2), Some(4));

        let lower = upper.transpose();
        assert_eq!(lower.shape(), TensorShape::LowerTriangularMatrix);
        assert_eq!(lower.index(2, 0), Some(4));
        assert_eq!(lower.index(0, 2), None);

        let diagonal = Tensor::with_shape(TensorShape::DiagonalMatrix, 3, 3).unwrap();
        let table = diagonal.look_up_table();
        assert_eq!(table.len(), 9);
        assert_eq!(table.iter().flatten().count(), 3);
        assert_eq!(table[4], Some(1));
    }

    #[test]
    fn transpose_and_reshape() {
        let matrix = Tensor::matrix(2, 3);
        assert_eq!(matrix.index(1, 2), Some(5));
        let transposed = matrix.transpose();
        assert_eq!((transposed.rows(), transposed.columns()), (3, 2));
        assert_eq!(transposed.index(2, 1), Some(5));
        assert_eq!(matrix.diagonal_elements(), (2, 3));

        let vector = matrix.reshape(6, 1).unwrap();
        assert!(vector.is_vector());
        assert!(transposed.reshape(1, 6).is_err());
        assert_eq!(Tensor::vector(3).transpose().shape(), TensorShape::RowVector);
    }
}

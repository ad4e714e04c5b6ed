use crate::orchestra::ConfigErr;

/// The sequences of one class together with one weight per sequence.
#[derive(Debug, Clone)]
pub struct ClassData<S> {
    sequences: Vec<S>,
    weights: Vec<f64>,
}

impl<S> ClassData<S> {
    /// Creates a class where every sequence has weight `1.0`.
    pub fn new(sequences: Vec<S>) -> Self {
        let weights = vec![1.0; sequences.len()];
        Self { sequences, weights }
    }

    /// Creates a class with explicit sequence weights.
    ///
    /// # Args
    /// * `sequences` - The sequences of the class.
    /// * `weights` - One non-negative, finite weight per sequence.
    ///
    /// # Errors
    /// A `ConfigErr` if the lengths differ or any weight is invalid. A lone
    /// class doesn't know its position, so the reported class index is `0`.
    pub fn weighted(sequences: Vec<S>, weights: Vec<f64>) -> Result<Self, ConfigErr> {
        if sequences.len() != weights.len() {
            return Err(ConfigErr::WeightsLengthMismatch {
                class: 0,
                got: weights.len(),
                expected: sequences.len(),
            });
        }

        if let Some(sequence) = invalid_weight(&weights) {
            return Err(ConfigErr::InvalidWeight { class: 0, sequence });
        }

        Ok(Self { sequences, weights })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    #[inline]
    pub fn sequences(&self) -> &[S] {
        &self.sequences
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Iterates over `(sequence, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&S, f64)> {
        self.sequences.iter().zip(self.weights.iter().copied())
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// The index of the first negative or non-finite weight.
fn invalid_weight(weights: &[f64]) -> Option<usize> {
    weights.iter().position(|w| !w.is_finite() || *w < 0.0)
}

/// An ordered collection of weighted class datasets.
///
/// Shared read-only with every worker once handed to an `Orchestrator`.
#[derive(Debug, Clone)]
pub struct DataSets<S> {
    classes: Vec<ClassData<S>>,
    sizes: Vec<usize>,
}

impl<S> DataSets<S> {
    /// Creates a new collection, re-checking every class' weights.
    ///
    /// # Errors
    /// A `ConfigErr` if there are no classes or any class has invalid weights.
    pub fn new(classes: Vec<ClassData<S>>) -> Result<Self, ConfigErr> {
        if classes.is_empty() {
            return Err(ConfigErr::NoClasses);
        }

        for (class, data) in classes.iter().enumerate() {
            if data.sequences.len() != data.weights.len() {
                return Err(ConfigErr::WeightsLengthMismatch {
                    class,
                    got: data.weights.len(),
                    expected: data.sequences.len(),
                });
            }

            if let Some(sequence) = invalid_weight(&data.weights) {
                return Err(ConfigErr::InvalidWeight { class, sequence });
            }
        }

        let sizes = classes.iter().map(ClassData::len).collect();
        Ok(Self { classes, sizes })
    }

    /// Builds a collection of unit-weighted classes.
    pub fn unweighted<I>(classes: I) -> Result<Self, ConfigErr>
    where
        I: IntoIterator<Item = Vec<S>>,
    {
        Self::new(classes.into_iter().map(ClassData::new).collect())
    }

    #[inline]
    pub fn classes(&self) -> &[ClassData<S>] {
        &self.classes
    }

    /// The data of class `index` (panics if out of bounds).
    #[inline]
    pub fn class(&self, index: usize) -> &ClassData<S> {
        &self.classes[index]
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// The amount of sequences of each class, in class order.
    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn total_sequences(&self) -> usize {
        self.sizes.iter().sum()
    }

    pub fn class_weight_sums(&self) -> Vec<f64> {
        self.classes.iter().map(ClassData::weight_sum).collect()
    }

    /// The sum of all sequence weights, the usual normalisation constant.
    pub fn total_weight(&self) -> f64 {
        self.classes.iter().map(ClassData::weight_sum).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unweighted_sizes_and_sums() {
        let data = DataSets::unweighted([vec![1, 2, 3], vec![], vec![4]]).unwrap();
        assert_eq!(data.sizes(), &[3, 0, 1]);
        assert_eq!(data.total_sequences(), 4);
        assert_eq!(data.class_weight_sums(), vec![3.0, 0.0, 1.0]);
        assert_eq!(data.total_weight(), 4.0);
    }

    #[test]
    fn weighted_class_is_validated() {
        assert!(matches!(
            ClassData::weighted(vec!['a', 'b'], vec![1.0]),
            Err(ConfigErr::WeightsLengthMismatch {
                got: 1,
                expected: 2,
                ..
            })
        ));
        assert!(matches!(
            ClassData::weighted(vec!['a', 'b'], vec![1.0, f64::NAN]),
            Err(ConfigErr::InvalidWeight { sequence: 1, .. })
        ));

        let class = ClassData::weighted(vec!['a', 'b'], vec![0.5, 2.0]).unwrap();
        assert_eq!(class.weight_sum(), 2.5);

        let pairs: Vec<_> = class.iter().collect();
        assert_eq!(pairs, vec![(&'a', 0.5), (&'b', 2.0)]);
    }

    #[test]
    fn negative_weight_reports_the_class() {
        let classes = vec![
            ClassData::new(vec![1.0]),
            ClassData {
                sequences: vec![1.0, 2.0],
                weights: vec![1.0, -1.0],
            },
        ];

        assert_eq!(
            DataSets::new(classes).unwrap_err(),
            ConfigErr::InvalidWeight {
                class: 1,
                sequence: 1,
            }
        );
    }

    #[test]
    fn no_classes_is_rejected() {
        let classes: Vec<ClassData<u8>> = Vec::new();
        assert_eq!(DataSets::new(classes).unwrap_err(), ConfigErr::NoClasses);
    }
}

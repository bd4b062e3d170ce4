//! Model implementations evaluated by the cross-validation core.

pub mod classical;

pub use classical::{
    Classifier, GaussianNb, KNeighborsClassifier, LinearDiscriminant, LogisticRegression,
    MajorityClass, NearestCentroid, NeighborWeights,
};

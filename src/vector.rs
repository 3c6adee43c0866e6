use crate::parameters::ParametersError;
use ndarray::{Array1, ArrayView1};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The four parameter groups of an LWR model, in their flattened order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParameterGroup {
    Centers,
    Widths,
    Offsets,
    Slopes,
}

impl ParameterGroup {
    pub const ALL: [ParameterGroup; 4] = [
        ParameterGroup::Centers,
        ParameterGroup::Widths,
        ParameterGroup::Offsets,
        ParameterGroup::Slopes,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Centers => "centers",
            Self::Widths => "widths",
            Self::Offsets => "offsets",
            Self::Slopes => "slopes",
        }
    }

    /// Non-zero tag written into selection masks for positions of this group.
    pub fn mask_tag(self) -> i32 {
        match self {
            Self::Centers => 1,
            Self::Widths => 2,
            Self::Offsets => 3,
            Self::Slopes => 4,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.label() == label)
    }
}

impl fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ParameterGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s.trim()).ok_or_else(|| {
            format!("unknown parameter group '{s}'; expected one of centers, widths, offsets, slopes")
        })
    }
}

/// Builds a selection mask for a flattened vector laid out as consecutive `(group, len)`
/// segments. Unselected positions are 0; selected ones carry the group's tag.
pub fn group_mask(layout: &[(ParameterGroup, usize)], selected: &[&str]) -> Array1<i32> {
    let mut wanted = BTreeSet::new();
    for label in selected {
        match ParameterGroup::from_label(label) {
            Some(group) => {
                wanted.insert(group);
            }
            None => log::warn!("[LWR vector] ignoring unknown parameter group '{}'", label),
        }
    }

    let total: usize = layout.iter().map(|(_, len)| len).sum();
    let mut mask = Array1::<i32>::zeros(total);
    let mut offset = 0;
    for &(group, len) in layout {
        if wanted.contains(&group) {
            mask.slice_mut(ndarray::s![offset..offset + len])
                .fill(group.mask_tag());
        }
        offset += len;
    }
    mask
}

/// Exposes a model's numeric parameters as one flat vector for black-box optimizers.
pub trait ParameterVector {
    /// Length of the flattened vector; fixed for the lifetime of the model.
    fn parameter_vector_size(&self) -> usize;

    fn parameter_vector_all(&self) -> Array1<f64>;

    /// Overwrites every parameter from `values`. Fails without mutating anything when the
    /// length differs from [`ParameterVector::parameter_vector_size`].
    fn set_parameter_vector_all(&mut self, values: ArrayView1<'_, f64>)
    -> Result<(), ParametersError>;

    fn selectable_parameters(&self) -> BTreeSet<&'static str>;

    fn parameter_vector_mask(&self, selected: &[&str]) -> Array1<i32>;

    /// Only the entries whose group is in `selected`, in flattened order.
    fn parameter_vector_selected(&self, selected: &[&str]) -> Array1<f64> {
        let mask = self.parameter_vector_mask(selected);
        let all = self.parameter_vector_all();
        all.iter()
            .zip(mask.iter())
            .filter(|&(_, &tag)| tag != 0)
            .map(|(&v, _)| v)
            .collect()
    }

    fn set_parameter_vector_selected(
        &mut self,
        selected: &[&str],
        values: ArrayView1<'_, f64>,
    ) -> Result<(), ParametersError> {
        let mask = self.parameter_vector_mask(selected);
        let n_selected = mask.iter().filter(|&&tag| tag != 0).count();
        if values.len() != n_selected {
            return Err(ParametersError::DimensionMismatch {
                expected: n_selected,
                found: values.len(),
            });
        }
        let mut all = self.parameter_vector_all();
        let mut next = values.iter();
        for (slot, &tag) in all.iter_mut().zip(mask.iter()) {
            if tag != 0
                && let Some(&v) = next.next()
            {
                *slot = v;
            }
        }
        self.set_parameter_vector_all(all.view())
    }
}

//! In-memory view of a CF-style NetCDF dataset
//!
//! Every stage after extraction reads a file into a [`Dataset`], reshapes it
//! and writes it back. Coordinates may be dimension coordinates (1-D, named
//! after their dimension) or scalar coordinates (0-D, referenced from a data
//! variable's `coordinates` attribute).

use crate::errors::{Result, SmnError};
use chrono::NaiveDateTime;
use ndarray::{ArrayD, Axis};

/// Attribute value kinds carried between files
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Strs(Vec<String>),
    Short(i16),
    Int(i32),
    Ints(Vec<i32>),
    Float(f32),
    Floats(Vec<f32>),
    Double(f64),
    Doubles(Vec<f64>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric scalar value, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Short(v) => Some(f64::from(*v)),
            AttrValue::Int(v) => Some(f64::from(*v)),
            AttrValue::Float(v) => Some(f64::from(*v)),
            AttrValue::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Double(v)
    }
}

/// Ordered attribute list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<(String, AttrValue)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttrValue::as_str)
    }

    /// Insert or replace, keeping the original position on replace
    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        let idx = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Values of a coordinate variable
#[derive(Debug, Clone, PartialEq)]
pub enum CoordValues {
    Numeric(Vec<f64>),
    Time(Vec<NaiveDateTime>),
}

impl CoordValues {
    pub fn len(&self) -> usize {
        match self {
            CoordValues::Numeric(v) => v.len(),
            CoordValues::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values selected by index, in the given order
    pub fn take(&self, indices: &[usize]) -> CoordValues {
        match self {
            CoordValues::Numeric(v) => CoordValues::Numeric(indices.iter().map(|&i| v[i]).collect()),
            CoordValues::Time(v) => CoordValues::Time(indices.iter().map(|&i| v[i]).collect()),
        }
    }

    /// Same kind and values, with a small tolerance for numeric values
    pub fn approx_eq(&self, other: &CoordValues) -> bool {
        match (self, other) {
            (CoordValues::Numeric(a), CoordValues::Numeric(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
            }
            (CoordValues::Time(a), CoordValues::Time(b)) => a == b,
            _ => false,
        }
    }

    /// Index of the value equal to `other[idx]`, if present
    pub fn position_of(&self, other: &CoordValues, idx: usize) -> Option<usize> {
        match (self, other) {
            (CoordValues::Numeric(a), CoordValues::Numeric(b)) => {
                a.iter().position(|x| (x - b[idx]).abs() < 1e-6)
            }
            (CoordValues::Time(a), CoordValues::Time(b)) => a.iter().position(|t| *t == b[idx]),
            _ => None,
        }
    }
}

/// A coordinate variable
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    /// `[name]` for dimension coordinates, empty for scalars
    pub dims: Vec<String>,
    pub values: CoordValues,
    pub attrs: Attributes,
}

impl Coordinate {
    pub fn dimension(name: &str, values: CoordValues) -> Self {
        Self {
            name: name.to_string(),
            dims: vec![name.to_string()],
            values,
            attrs: Attributes::new(),
        }
    }

    pub fn scalar(name: &str, values: CoordValues) -> Self {
        Self {
            name: name.to_string(),
            dims: Vec::new(),
            values,
            attrs: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.set(name, value);
        self
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }
}

/// A gridded data variable
#[derive(Debug, Clone, PartialEq)]
pub struct DataVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub data: ArrayD<f32>,
    pub attrs: Attributes,
}

impl DataVariable {
    pub fn new(name: &str, dims: Vec<String>, data: ArrayD<f32>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(SmnError::DimensionMismatch {
                input: dims,
                output: data.shape().iter().map(|s| s.to_string()).collect(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            dims,
            data,
            attrs: Attributes::new(),
        })
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Add a length-1 leading axis named `dim`
    pub fn expand_leading(&mut self, dim: &str) {
        let data = std::mem::take(&mut self.data);
        self.data = data.insert_axis(Axis(0));
        self.dims.insert(0, dim.to_string());
    }
}

/// Coordinates, data variables and global attributes of one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub coords: Vec<Coordinate>,
    pub data_vars: Vec<DataVariable>,
    pub attrs: Attributes,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coord(&self, name: &str) -> Option<&Coordinate> {
        self.coords.iter().find(|c| c.name == name)
    }

    pub fn coord_mut(&mut self, name: &str) -> Option<&mut Coordinate> {
        self.coords.iter_mut().find(|c| c.name == name)
    }

    pub fn data_var(&self, name: &str) -> Option<&DataVariable> {
        self.data_vars.iter().find(|v| v.name == name)
    }

    pub fn first_data_var(&self) -> Option<&DataVariable> {
        self.data_vars.first()
    }

    /// Add or replace a coordinate
    pub fn set_coord(&mut self, coord: Coordinate) {
        match self.coords.iter_mut().find(|c| c.name == coord.name) {
            Some(slot) => *slot = coord,
            None => self.coords.push(coord),
        }
    }

    /// Add or replace a data variable
    pub fn set_data_var(&mut self, var: DataVariable) {
        match self.data_vars.iter_mut().find(|v| v.name == var.name) {
            Some(slot) => *slot = var,
            None => self.data_vars.push(var),
        }
    }

    /// Remove a coordinate or data variable by name
    pub fn drop_var(&mut self, name: &str) -> bool {
        let before = self.coords.len() + self.data_vars.len();
        self.coords.retain(|c| c.name != name);
        self.data_vars.retain(|v| v.name != name);
        before != self.coords.len() + self.data_vars.len()
    }

    /// Dimension names and lengths, in order of first use
    pub fn dims(&self) -> Vec<(String, usize)> {
        let mut dims: Vec<(String, usize)> = Vec::new();
        for var in &self.data_vars {
            for (name, &len) in var.dims.iter().zip(var.data.shape()) {
                if !dims.iter().any(|(n, _)| n == name) {
                    dims.push((name.clone(), len));
                }
            }
        }
        for coord in &self.coords {
            for name in &coord.dims {
                if !dims.iter().any(|(n, _)| n == name) {
                    dims.push((name.clone(), coord.values.len()));
                }
            }
        }
        dims
    }

    pub fn dim_len(&self, name: &str) -> Option<usize> {
        self.dims()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, len)| len)
    }

    /// Keep, for every target value, the index of the nearest coordinate
    /// value along `dim`.
    pub fn sel_nearest(&mut self, dim: &str, targets: &[f64]) -> Result<()> {
        let coord = self.coord(dim).ok_or_else(|| SmnError::VariableNotFound {
            var: dim.to_string(),
            context: "dataset coordinates".to_string(),
        })?;
        let CoordValues::Numeric(values) = &coord.values else {
            return Err(SmnError::InvalidConfig(format!(
                "nearest selection needs a numeric '{}' coordinate",
                dim
            )));
        };
        if values.is_empty() {
            return Err(SmnError::InvalidConfig(format!("coordinate '{}' is empty", dim)));
        }

        let indices: Vec<usize> = targets
            .iter()
            .map(|t| {
                values
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| (*a - t).abs().total_cmp(&(*b - t).abs()))
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            })
            .collect();

        if let Some(coord) = self.coord_mut(dim) {
            coord.values = coord.values.take(&indices);
        }
        for var in &mut self.data_vars {
            if let Some(axis) = var.axis_of(dim) {
                var.data = var.data.select(Axis(axis), &indices);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn levels_dataset() -> Dataset {
        let data = ArrayD::from_shape_vec(IxDyn(&[5, 1]), vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let mut ds = Dataset::new();
        ds.set_coord(Coordinate::dimension(
            "isobaricInhPa",
            CoordValues::Numeric(vec![1000.0, 925.0, 850.0, 500.0, 250.0]),
        ));
        ds.set_data_var(
            DataVariable::new("u", vec!["isobaricInhPa".into(), "longitude".into()], data).unwrap(),
        );
        ds
    }

    #[test]
    fn nearest_selection_follows_targets() {
        let mut ds = levels_dataset();
        ds.sel_nearest("isobaricInhPa", &[925.0, 850.0, 500.0, 200.0]).unwrap();
        assert_eq!(
            ds.coord("isobaricInhPa").unwrap().values,
            CoordValues::Numeric(vec![925.0, 850.0, 500.0, 250.0])
        );
        let u = ds.data_var("u").unwrap();
        assert_eq!(u.data.shape(), &[4, 1]);
        assert_eq!(u.data.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn dims_and_expand() {
        let mut ds = levels_dataset();
        assert_eq!(
            ds.dims(),
            vec![("isobaricInhPa".to_string(), 5), ("longitude".to_string(), 1)]
        );
        let mut u = ds.data_var("u").unwrap().clone();
        u.expand_leading("time");
        assert_eq!(u.data.shape(), &[1, 5, 1]);
        assert_eq!(u.dims[0], "time");
        ds.set_data_var(u);
        assert_eq!(ds.dim_len("time"), Some(1));
        assert!(ds.drop_var("isobaricInhPa"));
        assert!(!ds.drop_var("isobaricInhPa"));
    }

    #[test]
    fn attribute_replace_keeps_order() {
        let mut attrs = Attributes::new();
        attrs.set("units", "K");
        attrs.set("long_name", "temperature");
        attrs.set("units", "degC");
        let names: Vec<_> = attrs.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["units", "long_name"]);
        assert_eq!(attrs.get_str("units"), Some("degC"));
        assert_eq!(attrs.remove("units"), Some(AttrValue::from("degC")));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn mismatched_rank_is_rejected() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[2, 2]));
        assert!(DataVariable::new("x", vec!["lat".into()], data).is_err());
    }
}

//! Plain serializable snapshots of dense variables and data arrays.
use super::element_array::ElementArray;
use super::variable::Variable;
use crate::dataset::DataArray;
use crate::error::{CoreError, Result};
use crate::layout::{Dim, Dimensions};
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub dims: Dimensions,
    pub unit: Unit,
    pub values: ElementArray,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variances: Option<ElementArray>,
}

impl VariableRecord {
    pub fn from_variable(var: &Variable) -> Result<Self> {
        if var.is_binned() {
            return Err(CoreError::TypeError("records hold dense data only".into()));
        }
        let (unit, values, variances) = var.dense_in(var.dims())?;
        Ok(Self { dims: var.dims().clone(), unit, values, variances })
    }

    pub fn into_variable(self) -> Result<Variable> {
        Variable::from_values(self.dims, self.unit, self.values, self.variances)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataArrayRecord {
    pub name: String,
    pub data: VariableRecord,
    #[serde(default)]
    pub coords: BTreeMap<Dim, VariableRecord>,
    #[serde(default)]
    pub masks: BTreeMap<String, VariableRecord>,
    #[serde(default)]
    pub attrs: BTreeMap<Dim, VariableRecord>,
}

fn records<K: Clone + Ord>(items: &BTreeMap<K, Variable>) -> Result<BTreeMap<K, VariableRecord>> {
    items.iter().map(|(k, v)| Ok((k.clone(), VariableRecord::from_variable(v)?))).collect()
}

impl DataArrayRecord {
    pub fn from_data_array(array: &DataArray) -> Result<Self> {
        Ok(Self {
            name: array.name().to_string(),
            data: VariableRecord::from_variable(array.data())?,
            coords: records(array.coords())?,
            masks: records(array.masks())?,
            attrs: records(array.attrs())?,
        })
    }

    pub fn into_data_array(self) -> Result<DataArray> {
        let mut array = DataArray::new(self.data.into_variable()?);
        array.set_name(self.name);
        for (dim, coord) in self.coords {
            array.set_coord(dim, coord.into_variable()?)?;
        }
        for (name, mask) in self.masks {
            array.set_mask(name, mask.into_variable()?)?;
        }
        for (dim, attr) in self.attrs {
            array.set_attr(dim, attr.into_variable()?)?;
        }
        Ok(array)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::InvalidArgument(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::InvalidArgument(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::creation::{array, array_1d};
    use rstest::rstest;

    #[test]
    fn test_data_array_json_round_trip() {
        let data = array(&["x"], &[2], vec![1.0, 2.0], Some(vec![0.5, 0.5].into()), Unit::counts()).unwrap();
        let mut da = DataArray::new(data);
        da.set_name("sample");
        da.set_coord("x", array_1d("x", vec![0.0, 1.0, 2.0], Unit::m()).unwrap()).unwrap();
        da.set_mask("bad", array_1d("x", vec![false, true], Unit::dimensionless()).unwrap()).unwrap();

        let json = DataArrayRecord::from_data_array(&da).unwrap().to_json().unwrap();
        let back = DataArrayRecord::from_json(&json).unwrap().into_data_array().unwrap();
        assert_eq!(back.name(), "sample");
        assert_eq!(back.data(), da.data());
        assert_eq!(back.coord("x").unwrap(), da.coord("x").unwrap());
        assert!(back.is_edges("x").unwrap());
        assert_eq!(back.mask("bad").unwrap().values::<bool>().unwrap(), vec![false, true]);
    }

    #[rstest]
    #[case(serde_json::json!({"labels": ["x", "x"], "shape": [2, 1]}))]
    #[case(serde_json::json!({"labels": ["x"], "shape": [2, 1]}))]
    #[case(serde_json::json!({"labels": ["x", "y"], "shape": [2]}))]
    fn test_record_rejects_invalid_dims(#[case] dims: serde_json::Value) {
        let var = array_1d("x", vec![1.0, 2.0], Unit::counts()).unwrap();
        let mut json = serde_json::to_value(VariableRecord::from_variable(&var).unwrap()).unwrap();
        json["dims"] = dims;
        assert!(serde_json::from_value::<VariableRecord>(json.clone()).is_err());

        let record = serde_json::json!({"name": "", "data": json});
        assert!(DataArrayRecord::from_json(&record.to_string()).is_err());
    }

    #[test]
    fn test_record_dims_round_trip() {
        let dims = Dimensions::new(&["x", "y"], &[2, 3]).unwrap();
        let back: Dimensions = serde_json::from_str(&serde_json::to_string(&dims).unwrap()).unwrap();
        assert_eq!(back, dims);
    }

    #[test]
    fn test_record_rejects_binned() {
        let table = DataArray::new(array_1d("row", vec![1.0, 2.0], Unit::counts()).unwrap());
        let binned = crate::bins::bins(None, None, "row", &table).unwrap();
        assert!(VariableRecord::from_variable(&binned).is_err());
    }
}

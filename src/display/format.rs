//! Human-readable summaries of variables, data arrays and datasets.
use crate::dataset::{DataArray, Dataset};
use crate::layout::Dimensions;
use crate::variable::Variable;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

const PREVIEW: usize = 4;

fn shape(dims: &Dimensions) -> String {
    let inner = dims.to_string();
    format!("({})", &inner[1..inner.len() - 1])
}

/// One-line summary: dims, dtype, unit, a value preview and whether variances are present.
pub fn summary(var: &Variable) -> String {
    let head = format!("{}  {}  [{}]", shape(var.dims()), var.dtype(), var.unit());
    if var.is_binned() {
        return match var.bin_parts() {
            Ok((ranges, dim, _)) => format!(
                "{}  binned along {}, {} rows in {} bins",
                head,
                dim,
                ranges.iter().map(|r| r.len()).sum::<usize>(),
                ranges.len(),
            ),
            Err(_) => head,
        };
    }
    match var.dense_in(var.dims()) {
        Ok((_, values, variances)) => {
            let mut line = format!("{}  {}", head, values.preview(PREVIEW));
            if let Some(v) = variances {
                let _ = write!(line, "  variances={}", v.preview(PREVIEW));
            }
            line
        }
        Err(_) => head,
    }
}

struct TreeWriter {
    output: String,
}

impl TreeWriter {
    fn section<K: fmt::Display>(&mut self, stem: &str, title: &str, items: &BTreeMap<K, Variable>, last: bool) {
        if items.is_empty() {
            return;
        }
        let connector = if last { "`--" } else { "|--" };
        let _ = writeln!(self.output, "{}{} {}:", stem, connector, title);
        let child_stem = format!("{}{}", stem, if last { "    " } else { "|   " });
        for (i, (key, var)) in items.iter().enumerate() {
            let connector = if i == items.len() - 1 { "`--" } else { "|--" };
            let _ = writeln!(self.output, "{}{} {}: {}", child_stem, connector, key, summary(var));
        }
    }

    fn data_array(&mut self, stem: &str, da: &DataArray) {
        let has_after_data = !da.masks().is_empty() || !da.attrs().is_empty();
        self.section(stem, "Coords", da.coords(), false);
        let connector = if has_after_data { "|--" } else { "`--" };
        let _ = writeln!(self.output, "{}{} Data: {}", stem, connector, summary(da.data()));
        self.section(stem, "Masks", da.masks(), da.attrs().is_empty());
        self.section(stem, "Attrs", da.attrs(), true);
    }
}

/// Tree rendering of a data array and its metadata.
pub fn format_data_array(da: &DataArray) -> String {
    let mut w = TreeWriter { output: String::new() };
    let _ = writeln!(w.output, "DataArray '{}' {}", da.name(), da.dims());
    w.data_array("", da);
    w.output
}

pub fn format_dataset(ds: &Dataset) -> String {
    let mut w = TreeWriter { output: String::new() };
    let _ = writeln!(w.output, "Dataset {}", ds.dims());
    w.section("", "Coords", ds.coords(), ds.is_empty());
    let names: Vec<&str> = ds.names().collect();
    for (i, name) in names.iter().enumerate() {
        let last = i == names.len() - 1;
        let _ = writeln!(w.output, "{} {}", if last { "`--" } else { "|--" }, name);
        match ds.get(name) {
            Ok(mut item) => {
                item.coords_mut().clear();
                let mut inner = TreeWriter { output: String::new() };
                inner.data_array("", &item);
                for line in inner.output.lines() {
                    let _ = writeln!(w.output, "{}{}", if last { "    " } else { "|   " }, line);
                }
            }
            Err(e) => {
                let _ = writeln!(w.output, "    [Err: {}]", e);
            }
        }
    }
    w.output
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable {}", summary(self))
    }
}

impl fmt::Display for DataArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_data_array(self))
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_dataset(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::bins;
    use crate::units::Unit;
    use crate::variable::creation::{array, array_1d};

    #[test]
    fn test_variable_summary() {
        let var = array(&["x"], &[5], vec![1.0, 2.0, 3.0, 4.0, 5.0], Some(vec![0.5; 5].into()), Unit::counts()).unwrap();
        assert_eq!(
            var.to_string(),
            "Variable (x: 5)  float64  [counts]  [1.0, 2.0, 3.0, 4.0, ...]  variances=[0.5, 0.5, 0.5, 0.5, ...]"
        );
    }

    #[test]
    fn test_binned_summary() {
        let table = DataArray::new(array_1d("row", vec![1.0, 2.0, 3.0], Unit::counts()).unwrap());
        let var = bins(None, None, "row", &table).unwrap();
        let text = summary(&var);
        assert!(text.contains("DataArrayView"), "{}", text);
        assert!(text.contains("binned along row, 3 rows in 3 bins"), "{}", text);
    }

    #[test]
    fn test_data_array_tree() {
        let da = DataArray::new(array_1d("x", vec![1i64, 2], Unit::counts()).unwrap())
            .with_coord("x", array_1d("x", vec![0.0, 1.0, 2.0], Unit::m()).unwrap())
            .unwrap()
            .with_mask("m", array_1d("x", vec![false, true], Unit::dimensionless()).unwrap())
            .unwrap();
        let text = da.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "DataArray '' {x: 2}");
        assert_eq!(lines[1], "|-- Coords:");
        assert_eq!(lines[2], "|   `-- x: (x: 3)  float64  [m]  [0.0, 1.0, 2.0]");
        assert_eq!(lines[3], "|-- Data: (x: 2)  int64  [counts]  [1, 2]");
        assert_eq!(lines[4], "`-- Masks:");
        assert_eq!(lines[5], "    `-- m: (x: 2)  bool  [dimensionless]  [false, true]");
    }
}

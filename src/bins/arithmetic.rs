//! Arithmetic between binned and dense variables: every row of a bin is combined with the
//! dense element of that bin.
use super::container::expect_row_table;
use crate::error::{CoreError, Result};
use crate::units::UnitPolicy;
use crate::variable::{kernel, BinaryOp, Variable};
use log::trace;

pub(crate) fn binned_dense(op: BinaryOp, binned: &Variable, dense: &Variable, policy: &UnitPolicy) -> Result<Variable> {
    let out = binned.copy()?;
    binned_dense_in_place(op, &out, dense, policy)?;
    Ok(out)
}

pub(crate) fn binned_dense_in_place(op: BinaryOp, binned: &Variable, dense: &Variable, policy: &UnitPolicy) -> Result<()> {
    if !binned.dims().includes(dense.dims()) {
        return Err(CoreError::mismatch(binned.dims(), dense.dims()));
    }
    let (ranges, dim, buffer) = binned.bin_parts()?;
    let content = buffer.data();
    expect_row_table(content, &dim)?;
    let unit = policy.infer(op, &content.unit(), &dense.unit())?;
    if unit != content.unit() && !binned.can_set_unit() {
        return Err(CoreError::InvalidArgument(
            "Partial view on data of variable cannot be used to change the unit".into(),
        ));
    }
    let dtype = content.dtype();
    if dtype.is_int() && (op == BinaryOp::Div || dense.dtype().is_float()) {
        return Err(CoreError::TypeError(format!(
            "cannot store the result of {} {} {} in bins",
            dtype,
            op.symbol(),
            dense.dtype()
        )));
    }
    let (_, per_bin, per_bin_var) = dense.dense_in(binned.dims())?;
    if per_bin_var.is_some() && !content.has_variances() {
        return Err(CoreError::VariancesError(
            "the dense operand has variances but the bin contents have none".into(),
        ));
    }

    // A row shared by overlapping bins keeps the result computed for the last of them.
    let (rows, owners): (Vec<usize>, Vec<usize>) = ranges
        .iter()
        .enumerate()
        .flat_map(|(b, r)| r.rows().map(move |i| (i, b)))
        .unzip();
    let (_, values, variances) = content.dense_in(content.dims())?;
    let lhs = values.gather(&rows);
    let lhs_var = variances.as_ref().map(|v| v.gather(&rows));
    let rhs = per_bin.gather(&owners);
    let rhs_var = per_bin_var.as_ref().map(|v| v.gather(&owners));
    let (result, result_var) = kernel::apply(op, dtype, &lhs, &rhs, lhs_var.as_ref(), rhs_var.as_ref())?;
    trace!("binned {} dense: {} rows in {} bins", op.symbol(), rows.len(), ranges.len());

    let mut new_values = values;
    new_values.scatter(&rows, &result)?;
    let new_variances = match (variances, result_var) {
        (Some(mut full), Some(v)) => {
            full.scatter(&rows, &v)?;
            Some(full)
        }
        (full, _) => full,
    };
    content.assign(&new_values, new_variances.as_ref())?;
    if unit != content.unit() {
        content.set_unit(unit)?;
    }
    Ok(())
}

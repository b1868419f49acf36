//! Plain-text analysis report, written alongside backend output when
//! `--emit-analysis` is set. Every section is sorted (by name, then by
//! instance id) so reports are deterministic.

use crate::{
    analyzer::mutability_label,
    resolver::{Bindings, SymbolId},
};

use super::AnalyzedProgram;

fn symbol_label(bindings: &Bindings, symbol: SymbolId) -> String {
    let info = bindings.symbol(symbol);
    format!("{}@{}", info.name, info.instance_id)
}

fn sorted_symbols(bindings: &Bindings, symbols: impl Iterator<Item = SymbolId>) -> Vec<SymbolId> {
    let mut out: Vec<SymbolId> = symbols.collect();
    out.sort_by(|a, b| {
        let sa = bindings.symbol(*a);
        let sb = bindings.symbol(*b);
        sa.name
            .cmp(&sb.name)
            .then(sa.instance_id.cmp(&sb.instance_id))
    });
    out
}

pub fn format_analysis_report(analyzed: &AnalyzedProgram, module_name: &str) -> String {
    let bindings = analyzed.bindings;
    let analysis = analyzed.analysis;
    let optimization = analyzed.optimization;
    let mut out = String::new();

    out.push_str("# Sable Analysis Report\n");
    if !module_name.is_empty() {
        out.push_str(&format!("Module: {module_name}\n"));
    }
    out.push('\n');

    out.push_str("## Optimization Summary\n");
    out.push_str(&format!(
        "- Constexpr expressions: {}\n",
        optimization.constexpr_values.len()
    ));
    out.push_str(&format!(
        "- Constexpr inits: {}\n",
        optimization.constexpr_inits.len()
    ));
    out.push_str(&format!(
        "- Foldable functions: {}\n",
        optimization.foldable_functions.len()
    ));
    out.push_str(&format!(
        "- Constexpr conditions: {}\n\n",
        optimization.constexpr_conditions.len()
    ));

    out.push_str("## Fold Skip Reasons\n");
    for symbol in sorted_symbols(bindings, optimization.fold_skip_reasons.keys().copied()) {
        out.push_str(&format!(
            "- {}: {}\n",
            symbol_label(bindings, symbol),
            optimization.fold_skip_reasons[&symbol]
        ));
    }
    out.push('\n');

    out.push_str("## Reachable Functions\n");
    for symbol in sorted_symbols(bindings, analysis.reachable_functions.iter().copied()) {
        out.push_str(&format!("- {}\n", symbol_label(bindings, symbol)));
    }
    out.push('\n');

    out.push_str("## Reentrancy Variants\n");
    for symbol in sorted_symbols(bindings, analysis.reentrancy_variants.keys().copied()) {
        let variants = &analysis.reentrancy_variants[&symbol];
        let tags: Vec<String> = variants.iter().map(|c| c.to_string()).collect();
        out.push_str(&format!(
            "- {}: {}\n",
            symbol_label(bindings, symbol),
            tags.join(",")
        ));
    }
    out.push('\n');

    out.push_str("## Ref Variants\n");
    for symbol in sorted_symbols(bindings, analysis.ref_variants.keys().copied()) {
        let masks: Vec<String> = analysis.ref_variants[&symbol]
            .iter()
            .map(|mask| {
                if mask.is_empty() {
                    "<default>".to_owned()
                } else {
                    mask.clone()
                }
            })
            .collect();
        out.push_str(&format!(
            "- {}: {}\n",
            symbol_label(bindings, symbol),
            masks.join(", ")
        ));
    }
    out.push('\n');

    out.push_str("## Variable Mutability\n");
    let mut mutability_lines: Vec<String> = analysis
        .var_mutability
        .iter()
        .map(|(symbol, mutability)| {
            format!(
                "- {} -> {}",
                symbol_label(bindings, *symbol),
                mutability_label(*mutability)
            )
        })
        .collect();
    mutability_lines.sort();
    for line in mutability_lines {
        out.push_str(&line);
        out.push('\n');
    }
    out.push('\n');

    out.push_str("## Used Globals\n");
    for symbol in sorted_symbols(bindings, analysis.used_global_vars.iter().copied()) {
        out.push_str(&format!("- {}\n", symbol_label(bindings, symbol)));
    }
    out.push('\n');

    out.push_str("## Used Types\n");
    for name in &analysis.used_type_names {
        out.push_str(&format!("- {name}\n"));
    }

    out
}

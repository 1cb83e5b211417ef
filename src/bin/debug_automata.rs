//! Debug script to dump every automata stage as ASCII

use island_generator::automata::{self, AutomataGrid, AutomataRules, BorderRule};
use island_generator::grid::Grid;
use std::fs::File;
use std::io::{self, Write};

fn write_mask(file: &mut File, title: &str, cells: &Grid<bool>) -> io::Result<()> {
    let filled = cells.as_slice().iter().filter(|&&c| c).count();
    writeln!(file, "--- {} ({} filled) ---", title, filled)?;
    for y in 0..cells.height() {
        let row: String = (0..cells.width())
            .map(|x| if *cells.get(x, y) { '#' } else { '.' })
            .collect();
        writeln!(file, "{}", row)?;
    }
    writeln!(file)
}

fn main() -> io::Result<()> {
    let width = 64;
    let height = 32;
    let rules = AutomataRules {
        seed: "debug-automata".to_string(),
        iteration_count: 4,
        fill_percent: 47,
        lower_bound_rule: 4,
        upper_bound_rule: 4,
        border_rule: BorderRule::StripBorder,
    };

    let mut file = File::create("automata_debug.txt")?;
    writeln!(file, "=== AUTOMATA DEBUG ({}x{}) seed={:?} ===", width, height, rules.seed)?;
    writeln!(
        file,
        "fill={}% iterations={} bounds={}..{} border={:?}",
        rules.fill_percent, rules.iteration_count, rules.lower_bound_rule, rules.upper_bound_rule, rules.border_rule
    )?;
    writeln!(file)?;

    let randomized = AutomataGrid::randomized(width, height, &rules);
    write_mask(&mut file, "randomized", randomized.cells())?;

    // Smooth one pass at a time so every intermediate grid is visible
    let mut cells = randomized.cells().clone();
    for i in 1..=rules.iteration_count {
        cells = automata::smooth_step(&cells, &rules);
        write_mask(&mut file, &format!("smoothed {}", i), &cells)?;
    }

    let squares = automata::remove_squares(&cells);
    write_mask(&mut file, "pseudo-squares removed", &squares)?;
    let cleaned = automata::remove_orphans(&squares);
    write_mask(&mut file, "orphans removed", &cleaned)?;

    let rotated = automata::rotate(&cleaned, 30.0);
    write_mask(&mut file, "rotated 30 degrees", &rotated)?;

    let regions = automata::regions(&cleaned);
    writeln!(file, "REGIONS: {}", regions.len())?;
    for (i, region) in regions.iter().enumerate() {
        let (x, y) = cleaned.coords(region[0]);
        writeln!(file, "  #{:<3} {:>5} cells, first at ({}, {})", i, region.len(), x, y)?;
    }

    println!("Wrote automata_debug.txt");
    Ok(())
}

//! This module is an integration test that explores small hand-assembled
//! programs symbolically and checks the paths and inputs that the search
//! reports.
#![cfg(test)]

use symbex_vm::{
    bytecode,
    class::{ClassBuilder, ConstantPool, Field, MethodBuilder},
    opcode::code::*,
    search::{PathOutcome, SearchStrategy},
    vm::{fault::AbortReason, value::Primitive, Config, EntryPoint, ExecutionMode, Outcome, ReturnedValue},
};

mod common;

/// `if (x < 0) return -1; if (x == 0) return 0; return 1;`
fn classify() -> Vec<u8> {
    bytecode![
        ILOAD_0,
        IFGE,
        branch(5),
        ICONST_M1,
        IRETURN,
        ILOAD_0,
        IFNE,
        branch(5),
        ICONST_0,
        IRETURN,
        ICONST_1,
        IRETURN
    ]
}

#[test]
fn finds_every_path_with_a_witness() -> anyhow::Result<()> {
    let library = common::single_method("(I)I", classify())?;
    let entry = common::run_entry("(I)I");
    let report = common::explore(&library, Config::default(), &entry)?;

    assert!(report.is_complete());
    let paths = report.solutions.iter().map(|s| s.path.clone()).collect::<Vec<_>>();
    assert_eq!(paths, vec![vec![0, 0], vec![0, 1], vec![1]]);
    assert_eq!(report.statistics.choice_points, 2);

    // Running each witness concretely takes the same path.
    for solution in &report.solutions {
        let input = solution
            .inputs
            .get("arg0")
            .copied()
            .ok_or_else(|| anyhow::anyhow!("No witness for arg0"))?;
        let mut vm = common::new_vm(&library, ExecutionMode::Concrete);
        let Outcome::Success(value) = vm.run(&entry.clone().with_argument(input.into())) else {
            anyhow::bail!("The witness {input} did not run to completion");
        };
        assert_eq!(solution.outcome, PathOutcome::Returned(value));
    }

    Ok(())
}

#[test]
fn iterative_deepening_finds_the_same_paths() -> anyhow::Result<()> {
    let library = common::single_method("(I)I", classify())?;
    let entry = common::run_entry("(I)I");

    let depth_first = common::explore(&library, Config::default(), &entry)?;
    let config = Config::default()
        .with_search_strategy(SearchStrategy::IterativeDeepening)
        .with_iterative_deepening(1, 1);
    let deepening = common::explore(&library, config, &entry)?;

    let mut paths = deepening.solutions.iter().map(|s| s.path.clone()).collect::<Vec<_>>();
    paths.sort();
    let expected = depth_first.solutions.iter().map(|s| s.path.clone()).collect::<Vec<_>>();
    assert_eq!(paths, expected);
    assert!(deepening.statistics.rounds > 1);

    Ok(())
}

#[test]
fn loops_over_symbolic_bounds_are_cut_off() -> anyhow::Result<()> {
    // while (x > 0) x--; return x;
    let code = bytecode![
        ILOAD_0,
        IFLE,
        branch(9),
        IINC,
        [0, 0xff],
        GOTO,
        branch(-7),
        ILOAD_0,
        IRETURN
    ];
    let library = common::single_method("(I)I", code)?;
    let config = Config::default().with_iterations_per_instruction(4);
    let report = common::explore(&library, config, &common::run_entry("(I)I"))?;

    assert!(report.statistics.pruned_loop_limit > 0);
    assert!(!report.solutions.is_empty());
    for solution in &report.solutions {
        match &solution.outcome {
            PathOutcome::Returned(ReturnedValue::Primitive(Primitive::Int(value))) => assert!(*value <= 0),
            other => anyhow::bail!("Unexpected path outcome {other:?}"),
        }
    }

    Ok(())
}

#[test]
fn generates_arrays_of_every_length_up_to_the_bound() -> anyhow::Result<()> {
    // return a[0];
    let library = common::single_method("([I)I", bytecode![ALOAD_0, ICONST_0, IALOAD, IRETURN])?;
    let config = Config::default().with_max_generated_array_length(2);
    let report = common::explore(&library, config, &common::run_entry("([I)I"))?;

    assert_eq!(report.solutions.len(), 3);
    let empty = &report.solutions[0];
    assert_eq!(empty.array_lengths.get("arg0"), Some(&0));
    assert!(matches!(
        &empty.outcome,
        PathOutcome::Exception { class, .. } if class == "java/lang/ArrayIndexOutOfBoundsException"
    ));
    for (solution, length) in report.solutions[1..].iter().zip(1..) {
        assert_eq!(solution.array_lengths.get("arg0"), Some(&length));
        assert!(solution.inputs.contains_key("arg0[0]"));
        assert!(matches!(solution.outcome, PathOutcome::Returned(_)));
    }

    Ok(())
}

#[test]
fn fields_of_object_inputs_become_inputs() -> anyhow::Result<()> {
    let point = ClassBuilder::new("Point")
        .field(Field::instance("x", "I")?)
        .build()?;
    let mut pool = ConstantPool::new();
    let x = pool.field("Point", "x", "I");
    // return p.x > 3 ? 1 : 0;
    let code = bytecode![
        ALOAD_0,
        GETFIELD,
        index(x),
        ICONST_3,
        IF_ICMPLE,
        branch(5),
        ICONST_1,
        IRETURN,
        ICONST_0,
        IRETURN
    ];
    let main = ClassBuilder::new("Main")
        .pool(pool)
        .method(
            MethodBuilder::new("run", "(LPoint;)I")
                .static_method()
                .code(code)
                .max_stack(2)
                .max_locals(1),
        )
        .build()?;
    let library = common::library(vec![point, main])?;
    let report = common::explore(&library, Config::default(), &EntryPoint::new("Main", "run", "(LPoint;)I"))?;

    assert_eq!(report.solutions.len(), 2);
    let witnesses = report
        .solutions
        .iter()
        .map(|solution| solution.inputs.get("arg0.x").copied())
        .collect::<Vec<_>>();
    assert!(matches!(witnesses[0], Some(Primitive::Int(x)) if x <= 3));
    assert!(matches!(witnesses[1], Some(Primitive::Int(x)) if x > 3));

    Ok(())
}

#[test]
fn the_instruction_budget_aborts_a_fruitless_search() -> anyhow::Result<()> {
    let library = common::single_method("(I)V", bytecode![GOTO, branch(0)])?;
    let entry = common::run_entry("(I)V");

    let report = common::explore(&library, Config::default(), &entry)?;
    assert!(report.is_complete());
    assert!(report.solutions.is_empty());
    assert_eq!(report.statistics.pruned_loop_limit, 1);

    let config = Config::default().with_max_instructions_without_new_solution(10);
    let report = common::explore(&library, config, &entry)?;
    assert_eq!(report.aborted, Some(AbortReason::InstructionBudget));

    Ok(())
}

#[test]
fn reports_serialise_to_json() -> anyhow::Result<()> {
    let library = common::single_method("(I)I", classify())?;
    let report = common::explore(&library, Config::default(), &common::run_entry("(I)I"))?;

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["solutions"].as_array().map(Vec::len), Some(3));
    assert_eq!(json["statistics"]["choice_points"], 2);
    assert!(json["solutions"][0]["inputs"].get("arg0").is_some());

    Ok(())
}

//! This module contains constants that are needed throughout the codebase.

/// The default maximum number of frames that may be live on the call stack at
/// once before the virtual machine reports a stack overflow.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// The default maximum number of objects that can be live in the heap before
/// the virtual machine reports that it has run out of memory.
pub const DEFAULT_MAX_HEAP_OBJECTS: usize = 1_000_000;

/// The default number of allocations between two attempts at reclaiming
/// unreachable heap objects.
pub const DEFAULT_GC_THRESHOLD: usize = 10_000;

/// The default number of times that a single instruction may be executed on one
/// symbolic path before the path is cut off as a probable endless loop.
pub const DEFAULT_ITERATIONS_PER_INSTRUCTION: usize = 32;

/// The default number of instructions that symbolic execution may run without
/// finding a new solution before the search gives up.
pub const DEFAULT_MAX_INSTRUCTIONS_WITHOUT_NEW_SOLUTION: usize = 1_000_000;

/// The default maximum length of arrays generated for symbolic array inputs.
pub const DEFAULT_MAX_GENERATED_ARRAY_LENGTH: usize = 3;

/// The default number of choice-point levels explored by the first round of
/// iterative deepening.
pub const DEFAULT_ITERATIVE_DEEPENING_INITIAL_DEPTH: usize = 4;

/// The default number of levels added between two rounds of iterative
/// deepening.
pub const DEFAULT_ITERATIVE_DEEPENING_INCREMENT: usize = 4;

/// The default number of loop iterations between two polls of the watchdog.
pub const DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS: usize = 100;

/// The default smallest integer considered by the bounded reference solver.
pub const DEFAULT_SOLVER_DOMAIN_MIN: i64 = -16;

/// The default largest integer considered by the bounded reference solver.
pub const DEFAULT_SOLVER_DOMAIN_MAX: i64 = 16;

/// The default number of constraint evaluations the bounded reference solver
/// may perform for one query before reporting a timeout.
pub const DEFAULT_SOLVER_EVALUATION_BUDGET: usize = 2_000_000;

/// The default choice-point depth at which the multi-worker mode partitions the
/// search tree between its workers.
pub const DEFAULT_PARALLEL_SPLIT_DEPTH: usize = 2;

/// The default number of workers of the multi-worker search mode.
pub const DEFAULT_PARALLEL_WORKERS: usize = 4;

/// The name of class initialisation methods.
pub const CLASS_INITIALIZER: &str = "<clinit>";

/// The name of instance constructors.
pub const CONSTRUCTOR: &str = "<init>";

/// The root of the class hierarchy.
pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";

/// The class of string objects.
pub const JAVA_LANG_STRING: &str = "java/lang/String";

/// The class of class mirror objects.
pub const JAVA_LANG_CLASS: &str = "java/lang/Class";

/// The root of the exception hierarchy.
pub const JAVA_LANG_THROWABLE: &str = "java/lang/Throwable";

/// The field of [`JAVA_LANG_THROWABLE`] holding the exception message.
pub const THROWABLE_MESSAGE_FIELD: &str = "detailMessage";

/// Exception raised on integer division by zero.
pub const ARITHMETIC_EXCEPTION: &str = "java/lang/ArithmeticException";

/// Exception raised when dereferencing `null`.
pub const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";

/// Exception raised on out-of-bounds array accesses.
pub const ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java/lang/ArrayIndexOutOfBoundsException";

/// Exception raised when creating an array with a negative size.
pub const NEGATIVE_ARRAY_SIZE_EXCEPTION: &str = "java/lang/NegativeArraySizeException";

/// Exception raised by failing reference casts.
pub const CLASS_CAST_EXCEPTION: &str = "java/lang/ClassCastException";

/// Exception raised when storing an incompatible reference into an array.
pub const ARRAY_STORE_EXCEPTION: &str = "java/lang/ArrayStoreException";

/// Error raised when a native method cannot be forwarded.
pub const UNSATISFIED_LINK_ERROR: &str = "java/lang/UnsatisfiedLinkError";

/// Error raised when a class initialiser completes with an uncaught exception.
pub const EXCEPTION_IN_INITIALIZER_ERROR: &str = "java/lang/ExceptionInInitializerError";

/// Error raised when invoking an abstract method.
pub const ABSTRACT_METHOD_ERROR: &str = "java/lang/AbstractMethodError";

/// Error raised when instantiating an abstract class or interface.
pub const INSTANTIATION_ERROR: &str = "java/lang/InstantiationError";

/// Exception raised when a monitor is exited without being owned.
pub const ILLEGAL_MONITOR_STATE_EXCEPTION: &str = "java/lang/IllegalMonitorStateException";

/// Error raised when a field is accessed as static when it is not, or the
/// other way around.
pub const INCOMPATIBLE_CLASS_CHANGE_ERROR: &str = "java/lang/IncompatibleClassChangeError";

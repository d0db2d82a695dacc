pub mod optimisation_algorithms {
    pub mod simplex_result;
    pub mod simplex_options;
    pub mod simplex_structure;
    pub mod linear_programming_helpers;
    pub mod linear_programming_sparse;
    pub mod linear_programming_lu;
    pub mod simplex_basis_inverse;
    pub mod simplex_store;
    pub mod simplex_store_dense;
    pub mod simplex_store_sparse;
    pub mod simplex_store_revised;
    pub mod simplex_engine;
    pub mod simplex_solvers;
    pub mod gomory_cuts;
    pub mod simplex;
    pub mod linear_programming;
}

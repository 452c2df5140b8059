//! Test state_dict save/load: init a model, save, load into new model, assert same forward.

use tensorgrad::{load_state_dict, save_state_dict, set_seed, Linear, Module, Shape, Tensor};

#[test]
fn test_state_dict_save_load_linear() {
    set_seed(99);

    let mut model = Linear::new(2, 1);
    model.init_xavier();

    let x = Tensor::from_vec(vec![1.0f32, 2.0], Shape::new(vec![1, 2]), false).unwrap();
    let out_before = model.forward(&x).unwrap();
    let out_before_data = out_before.to_vec();

    let states: Vec<_> = model.parameters().iter().map(|p| p.to_state()).collect();
    let path = std::env::temp_dir().join("tensorgrad_state_dict_test.json");
    save_state_dict(&path, &states).unwrap();

    let loaded_states = load_state_dict(&path).unwrap();
    let mut model2 = Linear::new(2, 1);
    for (p, state) in model2.parameters_mut().into_iter().zip(loaded_states.into_iter()) {
        p.data().load_data(&state.data).unwrap();
    }

    let out_after = model2.forward(&x).unwrap();
    let out_after_data = out_after.to_vec();

    assert_eq!(out_before_data.len(), out_after_data.len());
    for (a, b) in out_before_data.iter().zip(out_after_data.iter()) {
        assert!((a - b).abs() < 1e-5, "forward mismatch: {} vs {}", a, b);
    }

    let _: Result<(), _> = std::fs::remove_file(&path);
}
